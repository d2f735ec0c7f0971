//! The boundary between the pool and a backend.
//!
//! The pool never touches sockets or protocols itself; everything
//! backend-specific is funneled through one [`ResourceManager`]
//! implementation per adapter.

use async_trait::async_trait;

use crate::error::BoxDynError;

/// Factory and lifecycle hooks for one kind of pooled resource.
///
/// The pool calls [`open`](Self::open) to create resources,
/// [`close`](Self::close) to destroy them, and the hook methods on every
/// lifecycle transition. Hook failures are fatal for the resource they ran against:
/// the pool force-closes it and surfaces the error, since a failed hook
/// cannot be trusted to have left the resource in a known state.
///
/// A resource that breaks while sitting idle (for example the server closed
/// it) is expected to surface through a failing
/// [`on_active`](Self::on_active) hook on its next activation; the pool never lets
/// resources reach back into its own bookkeeping.
#[async_trait]
pub trait ResourceManager: Send + Sync + 'static {
    /// The pooled resource type, typically a backend connection.
    type Resource: Send + Sync + 'static;

    /// Open a new backend resource.
    async fn open(&self) -> Result<Self::Resource, BoxDynError>;

    /// Close a backend resource.
    ///
    /// Close errors are logged by the pool and never propagated: closing
    /// happens on paths (idle timeout, drain, recycling) with no caller left
    /// to receive them.
    async fn close(&self, resource: &Self::Resource) -> Result<(), BoxDynError>;

    /// Called every time a resource is handed to a caller, including waiter
    /// hand-offs.
    async fn on_active(&self, resource: &Self::Resource) -> Result<(), BoxDynError> {
        let _ = resource;
        Ok(())
    }

    /// Called every time a caller returns a resource that will be recycled.
    async fn on_idle(&self, resource: &Self::Resource) -> Result<(), BoxDynError> {
        let _ = resource;
        Ok(())
    }

    /// Called when a caller held a resource past the configured release
    /// timeout. Ownership of the resource passes to this method: the
    /// original holder's later `release`/`dispose` calls become no-ops and
    /// the pool will not close the resource itself.
    ///
    /// The default implementation closes the resource and logs any failure.
    async fn on_release_timeout(&self, resource: &Self::Resource) {
        if let Err(error) = self.close(resource).await {
            tracing::error!(error = %error, "failed to close connection after release timeout");
        }
    }

    /// Whether this manager takes responsibility for resources handed to
    /// [`on_release_timeout`](Self::on_release_timeout).
    ///
    /// Pool construction fails when a release timeout is configured and this
    /// returns `false`, mirroring the rule that a release timeout without a
    /// handler would silently leak resources.
    fn handles_release_timeout(&self) -> bool {
        false
    }
}
