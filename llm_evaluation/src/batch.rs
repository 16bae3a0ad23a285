use futures::{Stream, StreamExt};

use crate::error::EvalError;

/// Iterator over fixed-size groups of an underlying iterator.
pub struct Batched<I> {
    inner: I,
    size: usize,
    strict: bool,
    done: bool,
}

impl<I: Iterator> Iterator for Batched<I> {
    type Item = Result<Vec<I::Item>, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let batch: Vec<I::Item> = self.inner.by_ref().take(self.size).collect();
        if batch.is_empty() {
            self.done = true;
            return None;
        }
        if batch.len() < self.size {
            self.done = true;
            if self.strict {
                return Some(Err(EvalError::IncompleteBatch {
                    expected: self.size,
                    actual: batch.len(),
                }));
            }
        }
        Some(Ok(batch))
    }
}

/// Split `iter` into groups of `size`, preserving order.
///
/// The last group may be shorter unless `strict` is set, in which case a
/// short tail is reported as [`EvalError::IncompleteBatch`].
pub fn batched<I>(iter: I, size: usize, strict: bool) -> Result<Batched<I::IntoIter>, EvalError>
where
    I: IntoIterator,
{
    if size < 1 {
        return Err(EvalError::InvalidBatchSize(size));
    }
    Ok(Batched {
        inner: iter.into_iter(),
        size,
        strict,
        done: false,
    })
}

/// Same grouping as [`batched`] for items arriving from an async producer.
pub fn batched_stream<S>(
    stream: S,
    size: usize,
    strict: bool,
) -> Result<impl Stream<Item = Result<Vec<S::Item>, EvalError>>, EvalError>
where
    S: Stream,
{
    if size < 1 {
        return Err(EvalError::InvalidBatchSize(size));
    }
    Ok(stream.chunks(size).map(move |batch| {
        if strict && batch.len() != size {
            Err(EvalError::IncompleteBatch {
                expected: size,
                actual: batch.len(),
            })
        } else {
            Ok(batch)
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_batches_reconstruct_input() {
        let input: Vec<u32> = (0..10).collect();
        let batches: Vec<Vec<u32>> = batched(input.clone(), 3, false)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8], vec![9]]);
        assert_eq!(batches.concat(), input);
    }

    #[test]
    fn test_every_batch_but_last_is_full() {
        for n in 1..=7 {
            let batches: Vec<Vec<usize>> = batched(0..20, n, false)
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();
            let (last, full) = batches.split_last().unwrap();
            assert!(full.iter().all(|b| b.len() == n));
            assert!(!last.is_empty() && last.len() <= n);
        }
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        assert!(matches!(batched(vec![1, 2], 0, false), Err(EvalError::InvalidBatchSize(0))));
    }

    #[test]
    fn test_strict_rejects_short_tail() {
        let results: Vec<_> = batched(0..10, 3, true).unwrap().collect();
        assert_eq!(results.len(), 4);
        assert!(results[..3].iter().all(|r| r.is_ok()));
        assert!(matches!(
            results[3],
            Err(EvalError::IncompleteBatch { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_strict_accepts_exact_multiple() {
        let batches: Vec<Vec<i32>> = batched(0..9, 3, true)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert_eq!(batched(Vec::<u8>::new(), 4, true).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_stream_variant_matches_sync_grouping() {
        let batches: Vec<Vec<u32>> = batched_stream(stream::iter(0..10u32), 4, false)
            .unwrap()
            .map(|b| b.unwrap())
            .collect()
            .await;
        assert_eq!(batches, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);
    }

    #[tokio::test]
    async fn test_stream_variant_strict_and_invalid_size() {
        assert!(batched_stream(stream::iter(0..3u32), 0, false).is_err());

        let results: Vec<_> = batched_stream(stream::iter(0..5u32), 2, true)
            .unwrap()
            .collect()
            .await;
        assert!(results[2].is_err());
    }
}
