//! Query routing for the routed answer mode.
//!
//! A strict classifier decides whether a query needs the document corpus.
//! Anything other than a clean `DIRECT` becomes [`Route::Retrieve`], so an
//! ambiguous or chatty classifier answer errs towards grounding.

use crate::error::ServiceError;
use crate::llm::ChatModel;
use crate::models::Message;
use crate::prompts::{router_prompt, ROUTER_SYSTEM_PROMPT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Retrieve,
}

impl Route {
    /// Interpret a classifier reply. Unrecognized replies map to `Retrieve`.
    pub fn from_decision(decision: &str) -> Self {
        match decision.trim().to_uppercase().as_str() {
            "DIRECT" => Route::Direct,
            "RETRIEVE" => Route::Retrieve,
            other => {
                log::debug!("unrecognized route decision {:?}, retrieving", other);
                Route::Retrieve
            }
        }
    }
}

pub async fn route_query(model: &dyn ChatModel, query: &str) -> Result<Route, ServiceError> {
    let messages = [
        Message::system(ROUTER_SYSTEM_PROMPT),
        Message::user(router_prompt(query)),
    ];
    let reply = model.complete(&messages, &[], 0.0).await?;
    Ok(Route::from_decision(reply.content.as_deref().unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decisions() {
        assert_eq!(Route::from_decision("DIRECT"), Route::Direct);
        assert_eq!(Route::from_decision("  direct\n"), Route::Direct);
        assert_eq!(Route::from_decision("RETRIEVE"), Route::Retrieve);
    }

    #[test]
    fn test_ambiguous_defaults_to_retrieve() {
        assert_eq!(Route::from_decision(""), Route::Retrieve);
        assert_eq!(Route::from_decision("DIRECT, probably"), Route::Retrieve);
        assert_eq!(Route::from_decision("I am not sure"), Route::Retrieve);
    }
}
