//! TCP harness: accepts connections and serves each on its own thread

use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::smtp::error::SmtpError;
use crate::smtp::processor::SmtpProcessor;
use crate::smtp::spool::MessageSpool;

/// SMTP server that runs one [`SmtpProcessor`] session per accepted connection
#[derive(Clone)]
pub struct SmtpServer {
    processor: Arc<SmtpProcessor>,
    read_timeout: Option<Duration>,
}

impl SmtpServer {
    /// Create a server around a configured processor
    pub fn new(processor: SmtpProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
            read_timeout: None,
        }
    }

    pub fn from_config(config: &Config, spool: Arc<dyn MessageSpool>) -> Self {
        Self::new(SmtpProcessor::from_config(config, spool)).with_read_timeout(config.read_timeout())
    }

    /// Treat a connection that stays silent this long as closed
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn processor(&self) -> &SmtpProcessor {
        &self.processor
    }

    /// The spool finished messages are handed to
    pub fn spool(&self) -> &Arc<dyn MessageSpool> {
        self.processor.spool()
    }

    /// Bind `addr` and serve connections (blocking)
    pub fn start(&self, addr: impl ToSocketAddrs) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener)
    }

    /// Serve connections from an existing listener (blocking)
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!(
            address = %listener.local_addr()?,
            domain = self.processor.domain(),
            "SMTP server listening"
        );

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => self.spawn_session(stream),
                Err(e) => error!("Error accepting connection: {e}"),
            }
        }

        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream) {
        if let Err(e) = stream.set_read_timeout(self.read_timeout) {
            warn!("failed to set read timeout: {e}");
        }

        let processor = Arc::clone(&self.processor);
        let spawned = thread::Builder::new()
            .name("smtp-session".to_owned())
            .spawn(move || processor.handle(stream));
        if let Err(e) = spawned {
            error!("failed to spawn session thread: {e}");
        }
    }
}
