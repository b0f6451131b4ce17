//! Contexto de execução: cancelamento e prazo
//!
//! Toda operação pública recebe um [`Context`]. Quando o contexto é cancelado ou o
//! prazo vence, a operação devolve [`Error::Cancelled`] ou [`Error::Timeout`] sem
//! interferir em trabalho compartilhado (ex.: um refresh em andamento que outros
//! chamadores ainda aguardam).

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Contexto sem prazo e que nunca é cancelado
    pub fn background() -> Self {
        Self::default()
    }

    /// Contexto com prazo relativo a agora
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().timeout(timeout)
    }

    /// Contexto ligado a um token de cancelamento existente
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Define (ou encurta) o prazo deste contexto
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Contexto filho: cancelado junto com o pai, mas pode ser cancelado sozinho
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Executa `fut` até terminar, ou até o cancelamento/prazo do contexto.
    ///
    /// Se o contexto vencer primeiro, `fut` é descartado.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = deadline => Err(Error::Timeout),
            out = fut => out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes_without_deadline() {
        let ctx = Context::background();
        let out = ctx.run(async { Ok(42) }).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let ctx = Context::background();
        ctx.cancel();

        let err = ctx.run(async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = Context::with_timeout(Duration::from_millis(50));

        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_child_follows_parent_cancellation() {
        let parent = Context::background();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_timeout_only_shortens_deadline() {
        let ctx = Context::with_timeout(Duration::from_secs(1)).timeout(Duration::from_secs(60));
        let deadline = ctx.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_secs(1));
    }
}
