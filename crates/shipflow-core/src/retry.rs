//! リトライ実行
//!
//! ネットワーク越しの処理（ダウンロード、ビルド）を一定間隔で再試行します。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// デフォルトの試行回数
pub const DEFAULT_RETRIES: u32 = 5;

/// デフォルトの待機時間
pub const DEFAULT_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大試行回数（0 は 1 として扱う）
    pub retries: u32,
    /// 失敗後の待機時間
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            wait: DEFAULT_WAIT,
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, wait: Duration) -> Self {
        Self { retries, wait }
    }

    /// 成功するか試行回数を使い切るまで実行
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_with_stop(operation, |_| false).await
    }

    /// `stop_on` が真を返すエラーでは即座に中断する
    ///
    /// 試行回数を使い切った場合は最後のエラーをそのまま返す。
    pub async fn run_with_stop<T, E, F, Fut, S>(&self, mut operation: F, stop_on: S) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        S: Fn(&E) -> bool,
        E: Display,
    {
        let attempts = self.retries.max(1);
        let mut attempt = 1;

        loop {
            tracing::debug!(attempt, attempts, "Trying");

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "Try failed");

                    if stop_on(&e) || attempt >= attempts {
                        return Err(e);
                    }

                    tokio::time::sleep(self.wait).await;
                    attempt += 1;
                }
            }
        }
    }
}
