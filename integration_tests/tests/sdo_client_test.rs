//! Client tests against the mock SDO server

use std::sync::Arc;
use std::time::Duration;

use cansdo_client::{FrameRouter, RawAbortCode, SdoClient, SdoClientError, SharedSender};
use cansdo_common::objects::object_ids;
use cansdo_common::sdo::AbortCode;
use cansdo_common::traits::{CanReceiver, ObjectCache};
use cansdo_common::{CanId, NodeId, ObjectEntry};

use integration_tests::mock_server::MockServer;
use integration_tests::sim_bus::{SimBus, SimBusSender};

const SERVER_NODE_ID: u8 = 1;

fn setup() -> (SimBus, FrameRouter, MockServer, SdoClient<SimBusSender>) {
    let bus = SimBus::new();
    let server = MockServer::spawn(&bus, SERVER_NODE_ID);
    let router = FrameRouter::spawn(bus.new_receiver());
    let client = SdoClient::new_std(
        NodeId::new(SERVER_NODE_ID).unwrap(),
        bus.new_sender(),
        &router,
    );
    (bus, router, server, client)
}

#[test]
fn expedited_read() {
    let (_bus, _router, server, client) = setup();
    server.set_object(object_ids::IDENTITY, 1, &[0xFE, 0xCA]);

    let mut data = Vec::new();
    client
        .read(ObjectEntry::new(object_ids::IDENTITY, 1), &mut data)
        .unwrap();
    assert_eq!(vec![0xFE, 0xCA], data);

    assert_eq!(
        0xCAFE,
        client
            .read_u16(ObjectEntry::new(object_ids::IDENTITY, 1))
            .unwrap()
    );
}

#[test]
fn segmented_read() {
    let (_bus, _router, server, client) = setup();
    server.set_object(object_ids::DEVICE_NAME, 0, b"ABCDEFGHI");

    let mut data = Vec::new();
    client
        .read(ObjectEntry::new(object_ids::DEVICE_NAME, 0), &mut data)
        .unwrap();
    assert_eq!(b"ABCDEFGHI".to_vec(), data);

    assert_eq!(
        "ABCDEFGHI",
        client
            .read_visible_string(ObjectEntry::new(object_ids::DEVICE_NAME, 0))
            .unwrap()
    );
}

#[test]
fn expedited_write() {
    let (_bus, _router, server, client) = setup();

    client
        .write(ObjectEntry::new(0x1400, 2), &[0x01, 0x02, 0x03])
        .unwrap();
    assert_eq!(Some(vec![0x01, 0x02, 0x03]), server.get_object(0x1400, 2));
}

#[test]
fn write_read_roundtrip() {
    let (_bus, _router, _server, client) = setup();
    let entry = ObjectEntry::new(0x2000, 0);

    // lengths straddling the expedited boundary and the segment size
    for len in [1usize, 4, 5, 7, 8, 20] {
        let value: Vec<u8> = (0..len).map(|i| i as u8).collect();
        client.write(entry, &value).unwrap();

        let mut read_back = Vec::new();
        client.read(entry, &mut read_back).unwrap();
        assert_eq!(value, read_back, "length {len}");
    }
}

#[test]
fn segmented_write_wire_traffic() {
    let (bus, _router, server, client) = setup();
    let mut logger = bus.new_receiver();
    let req_id = CanId::Std(0x600 + SERVER_NODE_ID as u16);

    let value: Vec<u8> = (0..20).collect();
    client.write(ObjectEntry::new(0x2000, 0), &value).unwrap();
    assert_eq!(Some(value), server.get_object(0x2000, 0));

    let mut client_frames = Vec::new();
    while let Ok(Some(msg)) = logger.recv(Duration::from_millis(200)) {
        if msg.id() == req_id {
            client_frames.push(msg);
        }
    }

    // size-indicated initiate announcing 20 bytes
    assert_eq!(0x21, client_frames[0].data[0]);
    assert_eq!(20, client_frames[0].data[4]);
    assert_eq!(0, client_frames[0].data[7]);

    // ceil(20 / 7) segments with alternating toggle, last one flagged done
    let segments: Vec<_> = client_frames
        .iter()
        .filter(|msg| msg.data[0] >> 5 == 0)
        .collect();
    assert_eq!(3, segments.len());
    let toggles: Vec<bool> = segments.iter().map(|msg| msg.data[0] & 0x10 != 0).collect();
    assert_eq!(vec![false, true, false], toggles);
    assert_eq!(0, segments[0].data[0] & 1);
    assert_eq!(0, segments[1].data[0] & 1);
    assert_eq!(1, segments[2].data[0] & 1);
    // last segment carries 20 - 14 = 6 bytes -> one unused
    assert_eq!(1, (segments[2].data[0] >> 1) & 7);
}

#[test]
fn read_with_expected_size() {
    let (_bus, _router, server, client) = setup();
    server.set_object(object_ids::DEVICE_NAME, 0, b"ABCDEFGHI");
    let entry = ObjectEntry::new(object_ids::DEVICE_NAME, 0);

    let mut data = vec![0; 9];
    client.read(entry, &mut data).unwrap();
    assert_eq!(b"ABCDEFGHI".to_vec(), data);

    // a wrong pre-declared size is a size mismatch, not a short read
    let mut data = vec![0; 4];
    assert_eq!(
        Err(SdoClientError::LocalAbort {
            abort_code: AbortCode::DataTypeMismatch
        }),
        client.read(entry, &mut data)
    );
}

#[test]
fn missing_object_is_a_server_abort() {
    let (_bus, _router, _server, client) = setup();

    let err = client
        .read_u32(ObjectEntry::new(0x7123, 0))
        .unwrap_err();
    assert_eq!(
        SdoClientError::ServerAbort {
            index: 0x7123,
            sub: 0,
            abort_code: RawAbortCode::Valid(AbortCode::NoSuchObject),
        },
        err
    );
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn typed_accessors() {
    let (_bus, _router, server, client) = setup();
    let entry = ObjectEntry::new(0x2001, 3);

    client.write_u32(entry, 0xDEAD_BEEF).unwrap();
    assert_eq!(0xDEAD_BEEF, client.read_u32(entry).unwrap());

    client.write_i32(entry, -7).unwrap();
    assert_eq!(-7, client.read_i32(entry).unwrap());

    client.write_u8(entry, 0x5A).unwrap();
    assert_eq!(0x5A, client.read_u8(entry).unwrap());

    server.set_object(0x2002, 0, &[1, 2]);
    assert_eq!(
        Err(SdoClientError::UnexpectedSize),
        client.read_u8(ObjectEntry::new(0x2002, 0))
    );
}

#[test]
fn zero_length_value_is_incomplete() {
    let (_bus, _router, server, client) = setup();
    server.set_object(0x2003, 0, &[]);

    let mut data = Vec::new();
    assert_eq!(
        Err(SdoClientError::IncompleteTransfer {
            transferred: 0,
            expected: 0
        }),
        client.read(ObjectEntry::new(0x2003, 0), &mut data)
    );
    assert!(data.is_empty());
}

#[test]
fn concurrent_calls_serialize() {
    let (_bus, _router, server, client) = setup();
    server.set_object(0x2004, 0, &[0x11, 0x22, 0x33, 0x44]);
    let client = Arc::new(client);

    let mut threads = Vec::new();
    for _ in 0..2 {
        let client = client.clone();
        threads.push(std::thread::spawn(move || {
            for _ in 0..10 {
                let value = client.read_u32(ObjectEntry::new(0x2004, 0)).unwrap();
                assert_eq!(0x4433_2211, value);
            }
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }
}

#[test]
fn shared_sender_serves_two_clients() {
    let bus = SimBus::new();
    let server_a = MockServer::spawn(&bus, 1);
    let server_b = MockServer::spawn(&bus, 2);
    server_a.set_object(0x2000, 0, &[0xAA]);
    server_b.set_object(0x2000, 0, &[0xBB]);

    let router = FrameRouter::spawn(bus.new_receiver());
    let sender = SharedSender::new(bus.new_sender());
    let client_a = SdoClient::new_std(NodeId::new(1).unwrap(), sender.clone(), &router);
    let client_b = SdoClient::new_std(NodeId::new(2).unwrap(), sender, &router);

    assert_eq!(0xAA, client_a.read_u8(ObjectEntry::new(0x2000, 0)).unwrap());
    assert_eq!(0xBB, client_b.read_u8(ObjectEntry::new(0x2000, 0)).unwrap());
}

#[test]
fn cob_ids_fall_back_without_cache_entries() {
    struct EmptyCache;
    impl ObjectCache for EmptyCache {
        fn get_cached(&self, _index: u16, _sub_index: u8) -> Option<u32> {
            None
        }
    }

    let (bus, router, server, _client) = setup();
    server.set_object(0x2000, 0, &[0x42]);

    let client = SdoClient::from_cache(
        &EmptyCache,
        NodeId::new(SERVER_NODE_ID).unwrap(),
        bus.new_sender(),
        &router,
    );
    assert_eq!(0x42, client.read_u8(ObjectEntry::new(0x2000, 0)).unwrap());
}
