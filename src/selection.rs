//! Random record selection: keep a uniform sample of a source's well-formed records, in the
//! order they appear in the file.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

/// Sorted positions of `amount` records drawn without replacement from `total`.
/// A seed makes the draw reproducible; without one the OS entropy source is used.
pub fn choose_positions(total: usize, amount: usize, seed: Option<u64>) -> Vec<usize> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    };
    let mut picked = index::sample(&mut rng, total, amount.min(total)).into_vec();
    picked.sort_unstable();
    picked
}

/// Yields only the `Ok` items whose position (counting `Ok` items alone) was picked.
/// Errors pass through untouched. Stops reading once the last pick has been yielded.
pub struct Selected<I> {
    inner: I,
    picks: std::vec::IntoIter<usize>,
    next_pick: Option<usize>,
    pos: usize,
}

impl<I> Selected<I> {
    pub fn new(inner: I, picks: Vec<usize>) -> Self {
        let mut picks = picks.into_iter();
        let next_pick = picks.next();
        Self { inner, picks, next_pick, pos: 0 }
    }
}

impl<I, T, E> Iterator for Selected<I>
where
    I: Iterator<Item = Result<T, E>>,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let want = self.next_pick?;
            match self.inner.next()? {
                Err(e) => return Some(Err(e)),
                Ok(item) => {
                    let pos = self.pos;
                    self.pos += 1;
                    if pos == want {
                        self.next_pick = self.picks.next();
                        return Some(Ok(item));
                    }
                }
            }
        }
    }
}
