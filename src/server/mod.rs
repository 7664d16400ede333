mod forward;
mod handler;

pub use forward::Forwarder;
pub use handler::PolicyHandler;
