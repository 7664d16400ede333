use crate::policy::{BlockResponse, Outcome, PolicyEngine, PolicyMode, Verdict};
use crate::stats::StatsCollector;
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::proto::op::{Header, ResponseCode};
use hickory_server::proto::rr::rdata::{A, AAAA};
use hickory_server::proto::rr::{Name, RData, Record, RecordType};
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::{error, info, warn};

const NULL_ANSWER_TTL: u32 = 60;

/// Pipeline stage that evaluates each query against the domain list and
/// either hands it to `next` or answers it locally.
#[derive(Clone)]
pub struct PolicyHandler<N> {
    engine: PolicyEngine,
    mode: PolicyMode,
    stats: Arc<StatsCollector>,
    next: N,
}

impl<N: RequestHandler> PolicyHandler<N> {
    pub fn new(engine: PolicyEngine, mode: PolicyMode, stats: Arc<StatsCollector>, next: N) -> Self {
        Self {
            engine,
            mode,
            stats,
            next,
        }
    }

    async fn serve_blocked<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        owner: &Name,
        qtype: RecordType,
        response: BlockResponse,
    ) -> ResponseInfo {
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(false);

        let record = match response {
            BlockResponse::Refused => {
                header.set_response_code(ResponseCode::Refused);
                None
            }
            BlockResponse::NxDomain => {
                header.set_response_code(ResponseCode::NXDomain);
                None
            }
            BlockResponse::NullAddress => {
                let record = null_record(owner, qtype);
                if record.is_none() {
                    header.set_response_code(ResponseCode::NXDomain);
                }
                record
            }
        };

        let builder = MessageResponseBuilder::from_message_request(request);
        let message = builder.build(header, record.iter(), &[], &[], &[]);
        match response_handle.send_response(message).await {
            Ok(info) => info,
            Err(e) => {
                error!("Failed to send blocked response for {}: {}", owner, e);
                serve_failed(request)
            }
        }
    }
}

#[async_trait::async_trait]
impl<N: RequestHandler> RequestHandler for PolicyHandler<N> {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        self.stats.inc_queries();

        let Some(query) = request.queries().first() else {
            return self.next.handle_request(request, response_handle).await;
        };
        let owner = Name::from(query.name().clone());
        let name = owner.to_string();
        let qtype = query.query_type();

        if self.engine.evaluate(&name) == Outcome::Allow {
            return self.next.handle_request(request, response_handle).await;
        }

        self.stats.inc_flagged();
        let client = request.src().ip();
        match self.mode.verdict(Outcome::Flag) {
            Verdict::Respond(response) => {
                self.stats.inc_blocked();
                info!("Blocked {} {} for host {}", qtype, name, client);
                self.serve_blocked(request, response_handle, &owner, qtype, response)
                    .await
            }
            Verdict::Continue => {
                warn!(
                    target: "warnlist::notice",
                    "host {} requested watched domain: {}", client, name
                );
                self.next.handle_request(request, response_handle).await
            }
        }
    }
}

fn null_record(owner: &Name, qtype: RecordType) -> Option<Record> {
    let rdata = match qtype {
        RecordType::A => RData::A(A(Ipv4Addr::UNSPECIFIED)),
        RecordType::AAAA => RData::AAAA(AAAA(Ipv6Addr::UNSPECIFIED)),
        _ => return None,
    };
    Some(Record::from_rdata(owner.clone(), NULL_ANSWER_TTL, rdata))
}

/// Response info for a reply that could not be delivered.
pub(crate) fn serve_failed(request: &Request) -> ResponseInfo {
    let mut header = Header::response_from_request(request.header());
    header.set_response_code(ResponseCode::ServFail);
    header.into()
}
