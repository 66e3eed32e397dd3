//! Overload resolution
//!
//! A candidate's aggregate quality is the minimum of its per-argument
//! qualities; candidates scoring FAIL on any argument are discarded. The
//! highest aggregate wins. Ties go to non-variadic candidates, then to the
//! candidate with the most specific parameter types, then to the candidate
//! declared closest to the receiver's class, then to the first in
//! declaration order.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::convert::{Quality, ScoreCx};
use crate::error::{RejectedCandidate, Rejection, ResolutionError};
use crate::host::{ArgShape, HostValue};
use crate::reflect::{ClassInfo, MethodInfo, OverloadSet};
use crate::types::{TypeRef, OBJECT};

/// Arguments arranged one per declared parameter
#[derive(Debug)]
pub struct Bound<'a> {
    /// Aggregate quality
    pub quality: Quality,
    /// One value per parameter; a variadic tail is packed into a list
    pub args: Cow<'a, [HostValue]>,
}

/// Score a candidate and arrange the arguments for it.
///
/// For a variadic candidate a final argument that already converts to the
/// array type is passed as the array itself; otherwise the trailing
/// arguments are packed into one sequence.
pub fn bind<'a>(
    method: &MethodInfo,
    args: &'a [HostValue],
    cx: &ScoreCx<'_>,
) -> Result<Bound<'a>, Rejection> {
    let params = method.parameters();
    let arity_error = || Rejection::Arity {
        expected: params.len(),
        varargs: method.is_varargs(),
        provided: args.len(),
    };

    if !method.is_varargs() {
        if args.len() != params.len() {
            return Err(arity_error());
        }
        let quality = score_all(params, args, cx)?;
        return Ok(Bound {
            quality,
            args: Cow::Borrowed(args),
        });
    }

    let fixed = method.fixed_arity();
    if args.len() < fixed {
        return Err(arity_error());
    }
    let array_type = &params[fixed];

    if args.len() == params.len() {
        let direct = cx.score(&args[fixed], array_type);
        if direct.is_applicable() {
            let prefix = score_all(&params[..fixed], &args[..fixed], cx)?;
            return Ok(Bound {
                quality: prefix.min(direct),
                args: Cow::Borrowed(args),
            });
        }
    }

    let prefix = score_all(&params[..fixed], &args[..fixed], cx)?;
    let component = array_type.component().unwrap_or_else(|| TypeRef::from(OBJECT));
    let mut tail = Quality::Good;
    for (offset, arg) in args[fixed..].iter().enumerate() {
        let q = cx.score(arg, &component);
        if !q.is_applicable() {
            return Err(Rejection::Argument {
                index: fixed + offset,
                target: component.readable_name(),
            });
        }
        tail = tail.min(q);
    }
    let mut packed = args[..fixed].to_vec();
    packed.push(HostValue::List(args[fixed..].to_vec()));
    Ok(Bound {
        quality: prefix.min(tail),
        args: Cow::Owned(packed),
    })
}

fn score_all(
    params: &[TypeRef],
    args: &[HostValue],
    cx: &ScoreCx<'_>,
) -> Result<Quality, Rejection> {
    let mut aggregate = Quality::Perfect;
    for (index, (param, arg)) in params.iter().zip(args).enumerate() {
        let q = cx.score(arg, param);
        if !q.is_applicable() {
            return Err(Rejection::Argument {
                index,
                target: param.readable_name(),
            });
        }
        aggregate = aggregate.min(q);
    }
    Ok(aggregate)
}

/// An applicable candidate and what ranks it
struct Scored {
    index: usize,
    quality: Quality,
    varargs: bool,
    distance: usize,
}

/// Choose among applicable candidates.
///
/// Best aggregate quality first, fixed arity over variadic. Among what is
/// left, candidates whose parameters are all narrower than another's win;
/// then the nearest declaring class, then declaration order.
fn pick(candidates: &[Arc<MethodInfo>], applicable: &[Scored], cx: &ScoreCx<'_>) -> Option<usize> {
    let top = applicable.iter().map(|c| (c.quality, !c.varargs)).max()?;
    let tied: Vec<&Scored> = applicable
        .iter()
        .filter(|c| (c.quality, !c.varargs) == top)
        .collect();
    if tied.len() == 1 {
        return Some(tied[0].index);
    }
    let rank = |c: &Scored| (Reverse(c.distance), Reverse(c.index));

    let maximal = tied.iter().filter(|c| {
        !tied.iter().any(|other| {
            other.index != c.index
                && more_specific(&candidates[other.index], &candidates[c.index], cx)
        })
    });
    maximal
        .max_by_key(|c| rank(c))
        .or_else(|| tied.iter().max_by_key(|c| rank(c)))
        .map(|c| c.index)
}

/// Whether `a` is strictly more specific than `b`: same arity, and every
/// parameter of `a` fits the matching parameter of `b` but not the reverse
fn more_specific(a: &MethodInfo, b: &MethodInfo, cx: &ScoreCx<'_>) -> bool {
    let (pa, pb) = (a.parameters(), b.parameters());
    if pa.len() != pb.len() || pa == pb {
        return false;
    }
    let fits = |from: &[TypeRef], to: &[TypeRef]| {
        from.iter().zip(to).all(|(f, t)| narrower(f, t, cx))
    };
    fits(pa, pb) && !fits(pb, pa)
}

/// Whether every value of type `from` can occupy a slot of type `to`
fn narrower(from: &TypeRef, to: &TypeRef, cx: &ScoreCx<'_>) -> bool {
    if from == to {
        return true;
    }
    match (from.primitive(), to.primitive()) {
        (Some(f), Some(t)) => f.widens_to(t),
        (None, None) => match (cx.class(from), cx.class(to)) {
            (Some(f), Some(t)) => t.is_assignable_from(&f),
            _ => false,
        },
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolutionKey {
    set: u64,
    receiver: Option<Arc<str>>,
    shapes: Vec<ArgShape>,
}

/// Resolution counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Selections answered from the cache
    pub hits: u64,
    /// Selections that scored every candidate
    pub misses: u64,
    /// Cached selections
    pub entries: usize,
}

/// Picks the best overload for a call, memoising per call shape
pub struct OverloadResolver {
    cache: DashMap<ResolutionKey, usize>,
    enabled: bool,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl OverloadResolver {
    /// Create a resolver; `capacity == 0` or `enabled == false` disables
    /// memoisation
    pub fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            cache: DashMap::new(),
            enabled: enabled && capacity > 0,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Select the best candidate of `set` for `args`.
    ///
    /// `receiver` is the class the member was looked up on; it ranks
    /// equally good candidates by how close their declaring class is.
    pub fn select(
        &self,
        set: &OverloadSet,
        args: &[HostValue],
        receiver: Option<&ClassInfo>,
        cx: &ScoreCx<'_>,
    ) -> Result<Arc<MethodInfo>, ResolutionError> {
        let key = self.key(set, args, receiver);
        if let Some(key) = &key {
            let cached = self.cache.get(key).map(|index| *index);
            if let Some(method) = cached.and_then(|i| set.candidates().get(i)) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(
                    target: "jbridge::resolve",
                    member = set.name(),
                    signature = %method.short_signature(),
                    "resolution cache hit"
                );
                return Ok(Arc::clone(method));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut applicable = Vec::new();
        let mut rejected = Vec::new();
        for (index, method) in set.candidates().iter().enumerate() {
            match bind(method, args, cx) {
                Ok(bound) => {
                    let distance = receiver
                        .and_then(|r| r.distance_to(method.declaring_type().name()))
                        .unwrap_or(0);
                    trace!(
                        target: "jbridge::resolve",
                        signature = %method.short_signature(),
                        quality = %bound.quality,
                        distance,
                        "scored candidate"
                    );
                    applicable.push(Scored {
                        index,
                        quality: bound.quality,
                        varargs: method.is_varargs(),
                        distance,
                    });
                }
                Err(reason) => {
                    trace!(
                        target: "jbridge::resolve",
                        signature = %method.short_signature(),
                        %reason,
                        "rejected candidate"
                    );
                    rejected.push(RejectedCandidate {
                        signature: method.short_signature(),
                        reason,
                    });
                }
            }
        }

        let Some(index) = pick(set.candidates(), &applicable, cx) else {
            return Err(ResolutionError::NoApplicableOverload {
                name: set.name().to_string(),
                arguments: args.iter().map(|a| a.type_name().to_string()).collect(),
                rejected,
            });
        };
        if let Some(key) = key {
            if self.cache.len() >= self.capacity {
                self.cache.clear();
            }
            self.cache.insert(key, index);
        }
        Ok(Arc::clone(&set.candidates()[index]))
    }

    fn key(
        &self,
        set: &OverloadSet,
        args: &[HostValue],
        receiver: Option<&ClassInfo>,
    ) -> Option<ResolutionKey> {
        if !self.enabled {
            return None;
        }
        let shapes = args.iter().map(HostValue::shape).collect::<Option<Vec<_>>>()?;
        Some(ResolutionKey {
            set: set.id(),
            receiver: receiver.map(|r| Arc::from(r.name())),
            shapes,
        })
    }

    /// Forget every memoised selection
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
        }
    }
}

impl std::fmt::Debug for OverloadResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverloadResolver")
            .field("enabled", &self.enabled)
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
