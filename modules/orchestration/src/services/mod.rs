pub mod admission_service;
pub mod dispatch_service;
pub mod payment_service;

pub use admission_service::{AdmissionError, AdmissionService};
pub use dispatch_service::{DispatchError, DispatchService};
pub use payment_service::{PaymentError, PaymentService};
