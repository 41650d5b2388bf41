//! Scope Binding Module
//!
//! Reader-style context that binds a [`QueryClient`] to a subtree of
//! consumers. Scopes are immutable values passed down the consumer
//! construction path; there is no process-wide current client.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::client::QueryClient;
use crate::error::{QueryError, Result};

// == Scope ==
/// Position in the consumer tree.
///
/// A root scope is unbound. Binding a client yields a child scope; the parent
/// value is left untouched, so leaving the subtree means going back to using
/// the parent scope.
#[derive(Clone, Default)]
pub struct Scope {
    binding: Option<Arc<Binding>>,
}

struct Binding {
    client: QueryClient,
    parent: Option<Arc<Binding>>,
}

impl Scope {
    /// Returns an unbound scope.
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a child scope bound to `client`.
    ///
    /// The new binding shadows any enclosing one entirely.
    pub fn with_client(&self, client: QueryClient) -> Scope {
        trace!("Binding client {} at depth {}", client.id(), self.depth() + 1);

        Scope {
            binding: Some(Arc::new(Binding {
                client,
                parent: self.binding.clone(),
            })),
        }
    }

    /// Resolves the client of the nearest enclosing binding.
    pub fn client(&self) -> Result<QueryClient> {
        self.binding
            .as_ref()
            .map(|binding| binding.client.clone())
            .ok_or(QueryError::MissingClient)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Number of bindings enclosing this scope.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.binding.as_deref();
        while let Some(binding) = current {
            depth += 1;
            current = binding.parent.as_deref();
        }
        depth
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("client", &self.binding.as_ref().map(|b| b.client.id()))
            .field("depth", &self.depth())
            .finish()
    }
}

// == Provider ==
/// Binds one client to the consumers rendered beneath it.
#[derive(Debug, Clone)]
pub struct QueryClientProvider {
    client: QueryClient,
}

impl QueryClientProvider {
    pub fn new(client: QueryClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    /// Returns the scope seen by consumers beneath this provider.
    pub fn scope(&self, parent: &Scope) -> Scope {
        parent.with_client(self.client.clone())
    }

    /// Runs `children` inside this provider's scope and returns its result.
    pub fn render<R>(&self, parent: &Scope, children: impl FnOnce(&Scope) -> R) -> R {
        let scope = self.scope(parent);
        children(&scope)
    }
}

// == Consumer ==
/// Resolves the current client, failing if no provider encloses `scope`.
pub fn use_query_client(scope: &Scope) -> Result<QueryClient> {
    scope.client()
}
