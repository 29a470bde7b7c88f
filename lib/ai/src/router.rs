//! Label-to-handler routing.
//!
//! A [`Router`] can only be obtained from [`RouterBuilder::fallback`], so
//! every router has a handler for labels without an explicit route.

use crate::handler::Handler;
use crate::label::LabelSet;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Maps labels to handlers, with a mandatory fallback.
pub struct Router<L> {
    routes: HashMap<L, Arc<dyn Handler>>,
    fallback: Arc<dyn Handler>,
}

/// Collects routes until the fallback handler is supplied.
pub struct RouterBuilder<L> {
    routes: HashMap<L, Arc<dyn Handler>>,
}

impl<L: LabelSet> Router<L> {
    /// Starts building a router.
    #[must_use]
    pub fn builder() -> RouterBuilder<L> {
        RouterBuilder {
            routes: HashMap::new(),
        }
    }

    /// Selects the handler for a label.
    #[must_use]
    pub fn route(&self, label: L) -> &dyn Handler {
        let handler = match self.routes.get(&label) {
            Some(handler) => handler.as_ref(),
            None => self.fallback.as_ref(),
        };
        debug!(label = label.as_str(), handler = handler.name(), "route selected");
        handler
    }

    /// Selects the handler for raw, unparsed model output.
    #[must_use]
    pub fn route_raw(&self, raw: &str) -> &dyn Handler {
        match L::parse(raw) {
            Some(label) => self.route(label),
            None => self.fallback.as_ref(),
        }
    }

    /// Returns the fallback handler.
    #[must_use]
    pub fn fallback(&self) -> &dyn Handler {
        self.fallback.as_ref()
    }

    /// Returns true if `label` has an explicit route.
    #[must_use]
    pub fn has_route(&self, label: L) -> bool {
        self.routes.contains_key(&label)
    }
}

impl<L: LabelSet> RouterBuilder<L> {
    /// Routes `label` to `handler`, replacing any earlier route.
    #[must_use]
    pub fn route(self, label: L, handler: impl Handler + 'static) -> Self {
        self.route_shared(label, Arc::new(handler))
    }

    /// Routes `label` to a shared handler.
    #[must_use]
    pub fn route_shared(mut self, label: L, handler: Arc<dyn Handler>) -> Self {
        self.routes.insert(label, handler);
        self
    }

    /// Sets the fallback handler and finishes the router.
    #[must_use]
    pub fn fallback(self, handler: impl Handler + 'static) -> Router<L> {
        self.fallback_shared(Arc::new(handler))
    }

    /// Sets a shared fallback handler and finishes the router.
    #[must_use]
    pub fn fallback_shared(self, handler: Arc<dyn Handler>) -> Router<L> {
        Router {
            routes: self.routes,
            fallback: handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::handler::{booking_handler, info_handler, unclear_handler};
    use crate::label::CoordinatorLabel;
    use crate::request::Request;

    fn router() -> Router<CoordinatorLabel> {
        Router::builder()
            .route(CoordinatorLabel::Booker, booking_handler())
            .route(CoordinatorLabel::Info, info_handler())
            .fallback(unclear_handler())
    }

    #[test]
    fn exact_label_selects_branch() {
        assert_eq!(router().route(CoordinatorLabel::Booker).name(), "booker");
        assert_eq!(router().route_raw("booker").name(), "booker");
    }

    #[test]
    fn padded_label_selects_branch() {
        assert_eq!(router().route_raw("  Info \n").name(), "info");
    }

    #[test]
    fn unknown_label_selects_fallback() {
        let router = router();
        assert_eq!(router.route_raw("xyz").name(), "unclear");
        assert_eq!(router.route(CoordinatorLabel::Unclear).name(), "unclear");
        assert!(!router.has_route(CoordinatorLabel::Unclear));
    }

    #[test]
    fn routing_is_idempotent() {
        let router = router();
        let first = router.route_raw("INFO").name().to_string();
        assert_eq!(router.route_raw("INFO").name(), first);
    }

    #[tokio::test]
    async fn routed_handler_runs() {
        let router = router();
        let result = router
            .route_raw("xyz")
            .handle(&Request::new("Tell me about quantum physics."), &RequestContext::new())
            .await
            .expect("handle");
        assert_eq!(
            result.output,
            "Coordinator could not delegate request: 'Tell me about quantum physics.'. Please clarify."
        );
    }
}
