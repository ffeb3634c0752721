//! Core value types: requests, responses, expectations, and actions.

mod expectation;
mod request;
mod response;

pub use expectation::{
    Action, CallbackAction, CloseAction, DropPolicy, Expectation, ForwardAction, PathRewrite,
    Scheme, TimeToLive, Times,
};
pub use request::HttpRequest;
pub use response::{Delay, HttpResponse, ResponseMode, TimeUnit};
