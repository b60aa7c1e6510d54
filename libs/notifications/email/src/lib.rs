//! Email notifications over the SMTP work queue.
//!
//! - [`Email`]: validated payload published on `*.smtp.subscribe` / `*.smtp.send`
//! - [`SmtpSubject`] and [`SmtpStream`]: subject namespace and stream settings
//! - [`EmailProcessor`]: worker-side processor that hands each email to a [`Sender`]
//! - Senders: [`SmtpSender`] (STARTTLS, PLAIN auth) and [`LogSender`] for development
//!
//! ```ignore
//! use email::{Email, EmailProcessor, SmtpSender, SmtpStream, SmtpSubject};
//! use messaging::{ConsumerSpec, StreamSpec, Worker, WorkerConfig};
//!
//! let stream = StreamSpec::from_stream::<SmtpStream>();
//! let consumer = ConsumerSpec::new("mailer", namespace.render(SmtpSubject::Subscribe));
//! let mut worker: Worker<_, Email> = Worker::new(broker, &stream, consumer, config).await?;
//! worker.listen(shutdown_rx, &EmailProcessor::new(SmtpSender::from_url(&url)?)).await?;
//! ```

pub mod error;
pub mod models;
pub mod processor;
pub mod provider;
pub mod streams;

pub use error::{EmailError, SmtpError};
pub use models::{Address, Email, Recipient};
pub use processor::EmailProcessor;
pub use provider::{LogSender, Sender, SmtpConfig, SmtpSender};
pub use streams::{SmtpStream, SmtpSubject};
