//! Request matching engine.
//!
//! Matcher specifications are plain serde types that arrive on the control
//! plane; they are compiled once at registration (regexes pre-compiled,
//! lowercase forms cached) into `Compiled*` types that the data plane
//! evaluates without further allocation.
//!
//! Field rules: an absent matcher field matches anything; all present fields
//! must match (logical AND); multi-valued fields (headers, query parameters,
//! cookies) use subset semantics — entries not mentioned in the matcher are
//! ignored.

mod body_matcher;
mod field_matcher;
mod request_matcher;
mod string_matcher;

pub use body_matcher::{BodyMatch, CompiledBodyMatch};
pub use field_matcher::{compile_entries, CompiledFieldMatcher, ValueMatch};
pub use request_matcher::{CompiledRequestMatcher, RequestMatcher};
pub use string_matcher::{CachedValue, CompiledStringMatch, StringMatch};
