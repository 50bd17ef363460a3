//! Dependency resolution for review requests.
//!
//! A review request may list other review requests in `depends_on`. To build
//! it, every not-yet-submitted review in that transitive closure has to be
//! applied first. [`DependencyResolver`] walks the closure depth-first,
//! left-to-right, and returns the build set with dependencies before their
//! dependents. Each review appears once, at the position of its first
//! resolution, so diamond-shaped graphs collapse.
//!
//! Submitted reviews are walked but never emitted. A review that reappears on
//! its own ancestry path is a cycle and fails the whole resolution.

use std::collections::HashSet;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info};

use crate::api::{fetch_review_request, ReviewApi};
use crate::error::{Result, ReviewError};
use crate::model::{ReviewId, ReviewRequest};

/// Computes build sets against a [`ReviewApi`].
///
/// Holds no state between calls: every [`resolve`](Self::resolve) fetches
/// the dependency snapshots afresh and owns its own visited sets.
pub struct DependencyResolver<'a> {
    api: &'a dyn ReviewApi,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(api: &'a dyn ReviewApi) -> Self {
        Self { api }
    }

    /// Resolve the ordered build set for `review`.
    ///
    /// Returns [`ReviewError::Cycle`] naming `review` when its dependency
    /// closure is cyclic. Fetch and decode failures propagate unchanged.
    pub async fn resolve(&self, review: &ReviewRequest) -> Result<Vec<ReviewId>> {
        let mut walk = Walk::new(review.id.clone());
        walk.visit(self.api, review).await?;
        debug!(review_id = %review.id, build_set = ?walk.order, "resolved dependencies");
        Ok(walk.order)
    }
}

/// State of one top-level resolution.
struct Walk {
    root: ReviewId,
    /// Reviews on the current recursion stack.
    path: Vec<ReviewId>,
    /// Reviews whose subtree has been fully resolved.
    resolved: HashSet<ReviewId>,
    order: Vec<ReviewId>,
}

impl Walk {
    fn new(root: ReviewId) -> Self {
        Self {
            root,
            path: Vec::new(),
            resolved: HashSet::new(),
            order: Vec::new(),
        }
    }

    fn visit<'w>(
        &'w mut self,
        api: &'w dyn ReviewApi,
        review: &'w ReviewRequest,
    ) -> BoxFuture<'w, Result<()>> {
        async move {
            self.path.push(review.id.clone());

            for link in &review.depends_on {
                debug!(review_id = %review.id, dependency = %link.href, "dependent review");
                let dependency = fetch_review_request(api, &link.href).await?;

                if self.path.contains(&dependency.id) {
                    return Err(ReviewError::Cycle {
                        review_id: self.root.clone(),
                        repeated: dependency.id,
                    });
                }
                if self.resolved.contains(&dependency.id) {
                    continue;
                }
                self.visit(api, &dependency).await?;
            }

            self.path.pop();
            self.resolved.insert(review.id.clone());

            if review.is_submitted() {
                info!(review_id = %review.id, "review request is already submitted");
            } else {
                self.order.push(review.id.clone());
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fakes::{review_url, FakeReview, MemoryReviewApi};

    fn api_with(reviews: &[FakeReview]) -> MemoryReviewApi {
        let api = MemoryReviewApi::new();
        for review in reviews {
            api.add(review);
        }
        api
    }

    fn ids(list: &[u64]) -> Vec<ReviewId> {
        list.iter().copied().map(ReviewId::from).collect()
    }

    async fn resolve(api: &MemoryReviewApi, id: u64) -> Result<Vec<ReviewId>> {
        let review = fetch_review_request(api, &review_url(id)).await?;
        DependencyResolver::new(api).resolve(&review).await
    }

    #[tokio::test]
    async fn test_no_dependencies_yields_self() {
        let api = api_with(&[FakeReview::new(10)]);
        assert_eq!(resolve(&api, 10).await.unwrap(), ids(&[10]));
    }

    #[tokio::test]
    async fn test_siblings_in_declared_order_then_self() {
        let api = api_with(&[
            FakeReview::new(300).depends_on(&[301, 302]),
            FakeReview::new(301),
            FakeReview::new(302),
        ]);
        assert_eq!(resolve(&api, 300).await.unwrap(), ids(&[301, 302, 300]));

        let api = api_with(&[
            FakeReview::new(300).depends_on(&[302, 301]),
            FakeReview::new(301),
            FakeReview::new(302),
        ]);
        assert_eq!(resolve(&api, 300).await.unwrap(), ids(&[302, 301, 300]));
    }

    #[tokio::test]
    async fn test_chain_is_bottom_up() {
        let api = api_with(&[
            FakeReview::new(1).depends_on(&[2]),
            FakeReview::new(2).depends_on(&[3]),
            FakeReview::new(3),
        ]);
        assert_eq!(resolve(&api, 1).await.unwrap(), ids(&[3, 2, 1]));
    }

    #[tokio::test]
    async fn test_diamond_lists_shared_ancestor_once() {
        // A -> B, A -> C, B -> D, C -> D
        let api = api_with(&[
            FakeReview::new(1).depends_on(&[2, 3]),
            FakeReview::new(2).depends_on(&[4]),
            FakeReview::new(3).depends_on(&[4]),
            FakeReview::new(4),
        ]);
        let order = resolve(&api, 1).await.unwrap();
        assert_eq!(order, ids(&[4, 2, 3, 1]));
        assert_eq!(order.iter().filter(|id| id.as_str() == "4").count(), 1);
    }

    #[tokio::test]
    async fn test_submitted_reviews_are_excluded() {
        let api = api_with(&[
            FakeReview::new(1).depends_on(&[2, 3]),
            FakeReview::new(2).submitted(),
            FakeReview::new(3).submitted().depends_on(&[4]),
            FakeReview::new(4),
        ]);
        assert_eq!(resolve(&api, 1).await.unwrap(), ids(&[4, 1]));
    }

    #[tokio::test]
    async fn test_submitted_top_level_is_excluded() {
        let api = api_with(&[FakeReview::new(1).submitted().depends_on(&[2]), FakeReview::new(2)]);
        assert_eq!(resolve(&api, 1).await.unwrap(), ids(&[2]));
    }

    #[tokio::test]
    async fn test_two_node_cycle_names_top_level() {
        let api = api_with(&[
            FakeReview::new(200).depends_on(&[201]),
            FakeReview::new(201).depends_on(&[200]),
        ]);
        let err = resolve(&api, 200).await.unwrap_err();
        match err {
            ReviewError::Cycle { review_id, repeated } => {
                assert_eq!(review_id, ReviewId::from(200));
                assert_eq!(repeated, ReviewId::from(200));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_self_dependency_is_cycle() {
        let api = api_with(&[FakeReview::new(5).depends_on(&[5])]);
        let err = resolve(&api, 5).await.unwrap_err();
        assert!(matches!(err, ReviewError::Cycle { ref review_id, .. } if review_id.as_str() == "5"));
    }

    #[tokio::test]
    async fn test_cycle_through_submitted_reviews_is_detected() {
        let api = api_with(&[
            FakeReview::new(1).depends_on(&[2]),
            FakeReview::new(2).submitted().depends_on(&[3]),
            FakeReview::new(3).submitted().depends_on(&[2]),
        ]);
        let err = resolve(&api, 1).await.unwrap_err();
        match err {
            ReviewError::Cycle { review_id, repeated } => {
                assert_eq!(review_id, ReviewId::from(1));
                assert_eq!(repeated, ReviewId::from(2));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_long_cycle_is_detected() {
        let api = api_with(&[
            FakeReview::new(1).depends_on(&[2]),
            FakeReview::new(2).depends_on(&[3]),
            FakeReview::new(3).depends_on(&[4]),
            FakeReview::new(4).depends_on(&[1]),
        ]);
        assert!(matches!(
            resolve(&api, 1).await,
            Err(ReviewError::Cycle { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_cycle() {
        let api = api_with(&[FakeReview::new(1).depends_on(&[2])]);
        api.fail(
            review_url(2),
            FetchError::Status {
                url: review_url(2),
                status: 500,
                body: "boom".to_string(),
            },
        );
        let err = resolve(&api, 1).await.unwrap_err();
        assert!(matches!(err, ReviewError::Fetch(FetchError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_resolutions_are_independent() {
        let api = api_with(&[
            FakeReview::new(1).depends_on(&[3]),
            FakeReview::new(2).depends_on(&[3]),
            FakeReview::new(3),
        ]);
        assert_eq!(resolve(&api, 1).await.unwrap(), ids(&[3, 1]));
        assert_eq!(resolve(&api, 2).await.unwrap(), ids(&[3, 2]));
    }
}
