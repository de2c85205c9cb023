//! Live detection-activity ingestion
//!
//! ```text
//! SubscriptionSupervisor --offer--> ingestion queue --take--> BatchFlusher --> gateway
//!          └─ alert tag ------------------------------------------------> gateway
//! ```

pub mod alerts;
pub mod flusher;
pub mod prepare;
pub mod queue;
pub mod supervisor;

pub use alerts::AlertPolicy;
pub use flusher::{BatchFlusher, FlusherStats};
pub use prepare::prepare_detection;
pub use queue::{ingestion_queue, QueueConsumer, QueueProducer, Take};
pub use supervisor::{SubscriptionSupervisor, SupervisorState, SupervisorStats};
