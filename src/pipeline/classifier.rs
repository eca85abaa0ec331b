use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClassifierPolicy;
use crate::llm::{models::ChatRequest, LlmProvider};
use crate::pipeline::prompts;
use crate::store::models::Product;

/// Interprets a classifier reply. `None` when the reply is neither yes nor no.
pub fn parse_verdict(reply: &str) -> Option<bool> {
    let first = reply
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    match first.as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

/// Asks `provider` whether `message` belongs to the product's domain.
/// Errors and unclear replies resolve according to `policy`.
pub async fn classify(
    provider: &dyn LlmProvider,
    product: Product,
    message: &str,
    policy: ClassifierPolicy,
    cancel: &CancellationToken,
) -> bool {
    let fallback = policy == ClassifierPolicy::FailOpen;
    let request = ChatRequest::one_shot(prompts::classifier_prompt(product, message));

    match provider.complete(&request, cancel).await {
        Ok(reply) => match parse_verdict(&reply) {
            Some(verdict) => {
                debug!("Classifier verdict for message: {}", verdict);
                verdict
            }
            None => {
                warn!("Ambiguous classifier reply {:?}, using policy default", reply);
                fallback
            }
        },
        Err(e) if e.is_aborted() => fallback,
        Err(e) => {
            warn!("Classifier failed ({}), using policy default", e);
            fallback
        }
    }
}
