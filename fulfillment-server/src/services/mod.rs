//! External collaborators
//!
//! Every outbound dependency is a constructor-injected trait so the
//! orchestrator and workers can be tested against fakes:
//!
//! - [`PaymentGateway`] - creates payment authorizations
//! - [`PrintPartner`] - submits manufacturing jobs
//! - [`Mailer`] - sends customer notifications (best-effort)
//!
//! All HTTP impls carry bounded timeouts; a timeout is reported as a
//! retryable failure, never as proof the remote action did not happen.

pub mod mailer;
pub mod payment_gateway;
pub mod print_partner;

pub use mailer::{EmailKind, HttpMailer, Mailer, MailerError};
pub use payment_gateway::{GatewayError, HttpPaymentGateway, PaymentAuthorization, PaymentGateway};
pub use print_partner::{HttpPrintPartner, PrintJobRef, PrintJobRequest, PrintPartner, SubmitError};
