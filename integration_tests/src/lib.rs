pub mod mock_server;
pub mod sim_bus;
