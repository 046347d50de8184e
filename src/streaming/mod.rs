pub mod channel;
pub mod grpc_client;
pub mod transmit;
