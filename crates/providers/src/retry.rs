use ra_domain::Result;
use regex::Regex;
use std::future::Future;
use std::time::Duration;

pub const MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECONDS: f64 = 10.0;
const MAX_RETRY_DELAY_SECONDS: f64 = 60.0;

/// A rate-limit notice raised while retrying a provider call, for the
/// caller to turn into `rate_limit_retry` / `rate_limit_failed` events.
#[derive(Debug, Clone, Copy)]
pub enum RetryNotice {
    Retrying { attempt: u32, delay_seconds: f64 },
    Exhausted { max_retries: u32 },
}

/// Retry `request` up to [`MAX_RETRIES`] times when its error looks like a
/// rate-limit response (contains `"429"` or `"RESOURCE_EXHAUSTED"`), sleeping
/// for a delay parsed out of the error message (or the default) between
/// attempts. Any other error is returned immediately without retrying.
pub async fn call_with_retry<F, Fut, T>(mut request: F, mut on_notice: impl FnMut(RetryNotice)) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let message = err.to_string();
                let is_rate_limited =
                    message.contains("429") || message.contains("RESOURCE_EXHAUSTED");
                if !is_rate_limited {
                    return Err(err);
                }
                if attempt < MAX_RETRIES {
                    let delay = extract_retry_delay(&message)
                        .unwrap_or(DEFAULT_RETRY_DELAY_SECONDS)
                        .min(MAX_RETRY_DELAY_SECONDS);
                    on_notice(RetryNotice::Retrying {
                        attempt,
                        delay_seconds: delay,
                    });
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                    attempt += 1;
                    continue;
                }
                on_notice(RetryNotice::Exhausted {
                    max_retries: MAX_RETRIES,
                });
                return Err(err);
            }
        }
    }
}

fn extract_retry_delay(message: &str) -> Option<f64> {
    let re = Regex::new(r"(?i)retry\s+in\s+([\d.]+)s").ok()?;
    re.captures(message)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_delay_from_message() {
        assert_eq!(
            extract_retry_delay("429 rate limited, please retry in 3.5s"),
            Some(3.5)
        );
        assert_eq!(
            extract_retry_delay("RESOURCE_EXHAUSTED: Retry In 12s please"),
            Some(12.0)
        );
        assert_eq!(extract_retry_delay("no hint here"), None);
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_ok() {
        let mut calls = 0;
        let result = call_with_retry(
            || {
                calls += 1;
                async { Ok::<_, ra_domain::Error>(42) }
            },
            |_| panic!("should not notify"),
        )
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retries_on_rate_limit_then_succeeds() {
        let mut calls = 0;
        let mut notices = Vec::new();
        let result = call_with_retry(
            || {
                calls += 1;
                let call = calls;
                async move {
                    if call < 2 {
                        Err(ra_domain::Error::Provider {
                            provider: "test".into(),
                            message: "429 too many requests, retry in 0.01s".into(),
                        })
                    } else {
                        Ok(7)
                    }
                }
            },
            |notice| notices.push(notice),
        )
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls, 2);
        assert!(matches!(notices[0], RetryNotice::Retrying { attempt: 1, .. }));
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let mut calls = 0;
        let mut notices = Vec::new();
        let result: Result<i32> = call_with_retry(
            || {
                calls += 1;
                async {
                    Err(ra_domain::Error::Provider {
                        provider: "test".into(),
                        message: "429 retry in 0.01s".into(),
                    })
                }
            },
            |notice| notices.push(notice),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, MAX_RETRIES);
        assert!(matches!(
            notices.last().unwrap(),
            RetryNotice::Exhausted { max_retries: 3 }
        ));
    }

    #[tokio::test]
    async fn non_rate_limit_error_returns_immediately() {
        let mut calls = 0;
        let result: Result<i32> = call_with_retry(
            || {
                calls += 1;
                async { Err(ra_domain::Error::Other("boom".into())) }
            },
            |_| panic!("should not notify"),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
