pub mod gateway;
pub mod handler;
pub mod messages;
pub mod router;
pub mod session;
pub mod transport;

pub use gateway::{Connection, Gateway};
pub use handler::ws_handler;
pub use router::GroupRouter;
pub use transport::CallRegistry;
