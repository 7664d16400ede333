use super::handler::serve_failed;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::proto::op::{Header, ResponseCode};
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, error};

/// Terminal stage for the standalone binary: relays queries to fixed upstream
/// servers. No caching, no local answers.
#[derive(Clone)]
pub struct Forwarder {
    resolver: TokioResolver,
}

impl Forwarder {
    pub fn new(upstreams: &[SocketAddr], timeout: Duration) -> Self {
        let mut resolver_config = ResolverConfig::new();
        for addr in upstreams {
            resolver_config.add_name_server(NameServerConfig::new(*addr, Protocol::Udp));
            resolver_config.add_name_server(NameServerConfig::new(*addr, Protocol::Tcp));
        }

        let mut opts = ResolverOpts::default();
        opts.cache_size = 0;
        opts.timeout = timeout;

        let resolver =
            Resolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Self { resolver }
    }
}

#[async_trait::async_trait]
impl RequestHandler for Forwarder {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(false);
        header.set_recursion_available(true);
        let builder = MessageResponseBuilder::from_message_request(request);

        let Some(query) = request.queries().first() else {
            header.set_response_code(ResponseCode::FormErr);
            let response = builder.build(header, &[], &[], &[], &[]);
            return match response_handle.send_response(response).await {
                Ok(info) => info,
                Err(_) => serve_failed(request),
            };
        };
        let name = query.name().to_string();

        let result = match self.resolver.lookup(name.as_str(), query.query_type()).await {
            Ok(lookup) => {
                let response = builder.build(header, lookup.records().iter(), &[], &[], &[]);
                response_handle.send_response(response).await
            }
            Err(e) => {
                debug!("Upstream lookup failed for {}: {}", name, e);
                header.set_response_code(ResponseCode::ServFail);
                let response = builder.build(header, &[], &[], &[], &[]);
                response_handle.send_response(response).await
            }
        };

        match result {
            Ok(info) => info,
            Err(e) => {
                error!("Failed to send response for {}: {}", name, e);
                serve_failed(request)
            }
        }
    }
}
