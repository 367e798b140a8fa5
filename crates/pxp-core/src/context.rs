//! Request-scoped context propagation
//!
//! Tools are invoked from inside the agent driver without explicit argument
//! threading, so the authenticated user and bearer token travel out-of-band
//! in a task-local. The context is entered with `scope` around the whole
//! request future, which guarantees it is gone on every exit path (success,
//! failure, cancellation). Concurrent requests never observe each other's
//! context.

use std::future::Future;

use crate::auth::AuthUser;

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// Context of one in-flight request
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub token: String,
    pub user: AuthUser,
}

impl RequestContext {
    pub fn new(token: impl Into<String>, user: AuthUser) -> Self {
        Self {
            token: token.into(),
            user,
        }
    }

    /// Tenant the request is scoped to
    pub fn company_id(&self) -> i64 {
        self.user.company_id
    }
}

/// Run `fut` with `ctx` installed as the active request context
pub async fn scope<F>(ctx: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    REQUEST_CONTEXT.scope(ctx, fut).await
}

/// The active request context, if one is installed in this task
pub fn current() -> Option<RequestContext> {
    REQUEST_CONTEXT.try_with(|c| c.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn user(id: i64, company: i64) -> AuthUser {
        AuthUser {
            id,
            name: format!("user-{}", id),
            role: Role::Pm,
            company_id: company,
        }
    }

    #[tokio::test]
    async fn context_visible_only_inside_scope() {
        assert!(current().is_none());

        let ctx = RequestContext::new("tok", user(1, 10));
        scope(ctx, async {
            let active = current().expect("context set");
            assert_eq!(active.user.id, 1);
            assert_eq!(active.company_id(), 10);
        })
        .await;

        assert!(current().is_none());
    }

    #[tokio::test]
    async fn concurrent_tasks_do_not_share_context() {
        let a = tokio::spawn(scope(RequestContext::new("a", user(1, 10)), async {
            tokio::task::yield_now().await;
            current().expect("context").user.id
        }));
        let b = tokio::spawn(scope(RequestContext::new("b", user(2, 20)), async {
            tokio::task::yield_now().await;
            current().expect("context").user.id
        }));

        assert_eq!(a.await.expect("task a"), 1);
        assert_eq!(b.await.expect("task b"), 2);
    }

    #[tokio::test]
    async fn context_cleared_after_error_path() {
        let ctx = RequestContext::new("tok", user(3, 30));
        let result: Result<(), &str> = scope(ctx, async { Err("boom") }).await;
        assert!(result.is_err());
        assert!(current().is_none());
    }
}
