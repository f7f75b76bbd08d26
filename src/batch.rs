use rayon::prelude::*;

use crate::error::ForceError;
use crate::surface::Promise;

/// Forces every handle in parallel on the rayon pool.
///
/// Outcomes come back in input order, one per handle. A failing handle does
/// not stop the others from being forced.
pub fn force_all<H>(handles: &[H]) -> Vec<Result<&H::Value, ForceError>>
where
    H: Promise + Sync,
    H::Value: Sync,
{
    handles.par_iter().map(|handle| handle.force()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Deferred, ThreadFuture};
    use std::time::Duration;

    #[test]
    fn test_keeps_input_order() {
        let handles: Vec<_> = (0..6u64)
            .map(|i| {
                ThreadFuture::spawn(move || {
                    std::thread::sleep(Duration::from_millis(10 * (6 - i)));
                    anyhow::Ok(i * i)
                })
            })
            .collect();

        let values: Vec<u64> = force_all(&handles)
            .into_iter()
            .map(|outcome| *outcome.unwrap())
            .collect();

        assert_eq!(values, vec![0, 1, 4, 9, 16, 25]);
        assert!(handles.iter().all(|h| h.is_finished()));
    }

    #[test]
    fn test_failures_do_not_stop_the_rest() {
        let handles = vec![
            Deferred::new(|| anyhow::Ok(1)),
            Deferred::new(|| Err(anyhow::anyhow!("second one broke"))),
            Deferred::new(|| anyhow::Ok(3)),
        ];

        let outcomes = force_all(&handles);

        assert_eq!(outcomes[0].as_ref().unwrap(), &&1);
        assert_eq!(outcomes[1].as_ref().unwrap_err().to_string(), "second one broke");
        assert_eq!(outcomes[2].as_ref().unwrap(), &&3);
        assert!(handles.iter().all(Promise::is_resolved));
    }
}
