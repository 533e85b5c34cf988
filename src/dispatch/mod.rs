//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! WorkItem from the HTTP layer
//!     → admission.rs (take a slot or refuse at once)
//!     → pool.rs (bounded queue → one of N workers → Forward)
//!     → router.rs (outcome to the waiting caller, or logged and dropped)
//! ```
//!
//! # Design Decisions
//! - Admission is a counting semaphore; the permit travels with the job
//! - Correlation is a per-request one-shot channel, never a shared queue
//! - A worker fault still answers its caller

pub mod admission;
pub mod pool;
pub mod router;
pub mod types;

pub use admission::{AdmissionController, CapacityPermit};
pub use pool::Dispatcher;
pub use router::{Delivery, Reply, Ticket};
pub use types::{
    Cookie, DispatchError, ForwardError, ForwardOutcome, ForwardResult, Payload, TransportError,
    WorkItem,
};
