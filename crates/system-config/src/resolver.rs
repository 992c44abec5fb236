//! Duplicate detection and merging for declared entities.
//!
//! Every declaration kind has an identity (slot, control number, signature, ...). Two
//! declarations with the same identity either abort the load or are merged into one,
//! depending on the [`Policy`] chosen for that kind.

use core::fmt;

/// Structural identity shared by declarations of the same kind.
pub trait Collideable {
    fn collides_with(&self, other: &Self) -> bool;
}

/// What to do when two declarations collide.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Policy {
    /// Reject the set, naming the first colliding pair.
    Error,
    /// Replace every colliding pair with the combinator's merge of the two.
    Union,
}

/// Indices (in declaration order) of two colliding entities.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Collision {
    pub first: usize,
    pub second: usize,
}

impl fmt::Display for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "collision between index {} and {}",
            self.first, self.second
        )
    }
}

impl std::error::Error for Collision {}

/// Resolve collisions among `items` in one pairwise pass.
///
/// Under [`Policy::Union`] all items that took part in any collision are removed and one
/// `combine(a, b)` result per colliding pair is appended, in pair order. Merged results
/// are not compared again, so three mutually colliding items come back as three merged
/// items. `Union` without a combinator reports the first collision as an error.
pub fn resolve<T, F>(items: Vec<T>, policy: Policy, combine: Option<F>) -> Result<Vec<T>, Collision>
where
    T: Collideable + Clone,
    F: Fn(T, T) -> T,
{
    let mut pairs = Vec::new();
    for i in 0..items.len() {
        for j in i + 1..items.len() {
            if items[i].collides_with(&items[j]) {
                pairs.push(Collision { first: i, second: j });
            }
        }
    }
    let Some(&first) = pairs.first() else {
        return Ok(items);
    };
    let combine = match (policy, combine) {
        (Policy::Union, Some(f)) => f,
        _ => return Err(first),
    };

    let merged: Vec<T> = pairs
        .iter()
        .map(|p| combine(items[p.first].clone(), items[p.second].clone()))
        .collect();
    let mut out: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !pairs.iter().any(|p| p.first == *i || p.second == *i))
        .map(|(_, item)| item)
        .collect();
    tracing::debug!(pairs = pairs.len(), "merged colliding declarations");
    out.extend(merged);
    Ok(out)
}

/// Resolve under [`Policy::Error`].
pub fn unique<T: Collideable + Clone>(items: Vec<T>) -> Result<Vec<T>, Collision> {
    resolve(items, Policy::Error, None::<fn(T, T) -> T>)
}

/// Resolve under [`Policy::Union`] with `combine`.
pub fn union<T, F>(items: Vec<T>, combine: F) -> Result<Vec<T>, Collision>
where
    T: Collideable + Clone,
    F: Fn(T, T) -> T,
{
    resolve(items, Policy::Union, Some(combine))
}
