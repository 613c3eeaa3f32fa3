pub mod error;
pub mod messages;
pub mod rooms;
pub mod routes;
pub mod service;

pub use error::ServiceError;
pub use routes::router;
pub use service::RoomService;
