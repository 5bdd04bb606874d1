pub mod ip_transport;
pub mod phone_transport;
pub mod sensor_dispatch;
pub mod shared;
pub mod worker;

pub use shared::SharedClient;
pub use worker::{run as run_worker, WorkerConfig};
