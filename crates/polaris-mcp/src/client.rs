use rmcp::model::{
    ClientCapabilities, ClientInfo, CreateMessageRequestParam, CreateMessageResult,
    Implementation, LoggingLevel, LoggingMessageNotificationParam,
};
use rmcp::service::{NotificationContext, RequestContext};
use rmcp::{ClientHandler, ErrorData, RoleClient};
use tracing::{debug, error, info, warn};

use crate::sampling::SamplingRelay;

pub const CLIENT_NAME: &str = "polaris";

/// The client side of one provider connection. Handles what the provider
/// sends us: log notifications and sampling requests.
#[derive(Debug, Clone)]
pub struct PolarisClient {
    server: String,
    relay: SamplingRelay,
}

impl PolarisClient {
    pub fn new(server: impl Into<String>, relay: SamplingRelay) -> Self {
        Self {
            server: server.into(),
            relay,
        }
    }
}

impl ClientHandler for PolarisClient {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::builder().enable_sampling().build(),
            client_info: Implementation {
                name: CLIENT_NAME.into(),
                title: None,
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
        }
    }

    async fn create_message(
        &self,
        params: CreateMessageRequestParam,
        _context: RequestContext<RoleClient>,
    ) -> Result<CreateMessageResult, ErrorData> {
        debug!(server = %self.server, "provider requested sampling");
        self.relay.relay(params).await
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        let server = self.server.as_str();
        let logger = params.logger.as_deref().unwrap_or_default();
        let data = &params.data;
        match params.level {
            LoggingLevel::Debug => {
                debug!(target: "polaris::provider", server, logger, %data, "provider log")
            }
            LoggingLevel::Info | LoggingLevel::Notice => {
                info!(target: "polaris::provider", server, logger, %data, "provider log")
            }
            LoggingLevel::Warning => {
                warn!(target: "polaris::provider", server, logger, %data, "provider log")
            }
            LoggingLevel::Error
            | LoggingLevel::Critical
            | LoggingLevel::Alert
            | LoggingLevel::Emergency => {
                error!(target: "polaris::provider", server, logger, %data, "provider log")
            }
        }
    }
}
