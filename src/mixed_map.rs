//! Memory-bounded batched mapping.
//!
//! [`MixedMap`] evaluates a function over every index of a batch axis. The
//! axis is cut into `iters` chunks that run one after another, while the
//! elements of a chunk run in parallel. Peak memory is therefore about
//! `N / iters` element evaluations instead of `N`, and the result is the same
//! for every choice of `iters`.

use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{concatenate, stack, ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{Error, Result};

static MIXED_MAP_ITERS: AtomicUsize = AtomicUsize::new(1);

/// Process-wide default number of sequential chunks.
pub fn get_mixed_map_iters() -> usize {
    MIXED_MAP_ITERS.load(Ordering::Relaxed)
}

/// Set the process-wide default number of sequential chunks.
///
/// Every map without explicit settings reads this value when it is called,
/// including maps built before the change.
pub fn set_mixed_map_iters(iters: usize) -> Result<()> {
    let settings = MixedMapSettings::new(iters)?;
    MIXED_MAP_ITERS.store(settings.iters, Ordering::Relaxed);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MixedMapSettings {
    /// Number of sequential chunks the batch axis is split into. Never zero.
    iters: usize,
}

impl Default for MixedMapSettings {
    fn default() -> Self {
        Self { iters: 1 }
    }
}

impl MixedMapSettings {
    pub fn new(iters: usize) -> Result<Self> {
        if iters == 0 {
            return Err(Error::Config(
                "the number of mixed map iterations must be positive".to_string(),
            ));
        }
        Ok(Self { iters })
    }

    pub fn from_global() -> Self {
        Self {
            iters: get_mixed_map_iters(),
        }
    }

    pub fn iters(&self) -> usize {
        self.iters
    }
}

/// How a batch axis of `axis_size` elements is cut into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub axis_size: usize,
    /// Elements evaluated in parallel per chunk.
    pub vmap_size: usize,
    /// Number of sequential chunks.
    pub lmap_size: usize,
    /// Zero rows appended so that `lmap_size * vmap_size` covers the axis.
    pub padding: usize,
}

impl ChunkPlan {
    pub fn new(axis_size: usize, settings: MixedMapSettings) -> Result<Self> {
        let iters = settings.iters;
        if axis_size == 0 {
            return Err(Error::Shape("cannot map over an empty axis".to_string()));
        }
        let vmap_size = axis_size.div_ceil(iters);
        let lmap_size = axis_size.div_ceil(vmap_size);
        Ok(Self {
            axis_size,
            vmap_size,
            lmap_size,
            padding: vmap_size * lmap_size - axis_size,
        })
    }
}

fn move_axis<'a>(view: ArrayViewD<'a, f64>, from: usize, to: usize) -> ArrayViewD<'a, f64> {
    let mut perm: Vec<usize> = (0..view.ndim()).collect();
    let axis = perm.remove(from);
    perm.insert(to, axis);
    view.permuted_axes(perm)
}

/// Pad the leading axis with zeros and fold it into `(lmap_size, vmap_size, ...)`.
fn chunk_arg(arg: ArrayViewD<'_, f64>, plan: &ChunkPlan) -> Result<ArrayD<f64>> {
    let padded = if plan.padding > 0 {
        let mut pad_shape = arg.shape().to_vec();
        pad_shape[0] = plan.padding;
        let zeros = ArrayD::<f64>::zeros(IxDyn(&pad_shape));
        concatenate(Axis(0), &[arg.view(), zeros.view()])?
    } else {
        arg.to_owned()
    };

    let mut shape = vec![plan.lmap_size, plan.vmap_size];
    shape.extend_from_slice(&arg.shape()[1..]);
    Ok(padded
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(&shape))?)
}

/// Stack per-element outputs `[element][output]` into one array per output.
fn stack_outputs(results: Vec<Vec<ArrayD<f64>>>) -> Result<Vec<ArrayD<f64>>> {
    let num_outputs = results.first().map(Vec::len).unwrap_or(0);
    if results.iter().any(|out| out.len() != num_outputs) {
        return Err(Error::Shape(
            "mapped function returned a varying number of outputs".to_string(),
        ));
    }
    (0..num_outputs)
        .map(|k| {
            let views: Vec<_> = results.iter().map(|out| out[k].view()).collect();
            stack(Axis(0), &views).map_err(|err| {
                Error::Shape(format!("output {k} has a varying shape across the batch: {err}"))
            })
        })
        .collect()
}

/// A function mapped over a batch axis in sequential chunks of parallel work.
///
/// `fun` receives one view per argument, in the original order: mapped
/// arguments with their batch axis removed, unmapped arguments as given. It
/// returns one array per output. Padding rows are evaluated with all-zero
/// mapped inputs, so `fun` must accept those.
pub struct MixedMap<F> {
    fun: F,
    in_axes: Option<Vec<Option<usize>>>,
    out_axes: Option<Vec<usize>>,
    settings: Option<MixedMapSettings>,
}

/// Wrap `fun` so that every call uses the process-wide iteration count.
///
/// `in_axes` defaults to mapping axis 0 of every argument, `out_axes` to
/// placing the batch axis first in every output.
pub fn mixed_map<F>(
    fun: F,
    in_axes: Option<Vec<Option<usize>>>,
    out_axes: Option<Vec<usize>>,
) -> MixedMap<F>
where
    F: Fn(&[ArrayViewD<'_, f64>]) -> Result<Vec<ArrayD<f64>>> + Sync,
{
    MixedMap {
        fun,
        in_axes,
        out_axes,
        settings: None,
    }
}

impl<F> MixedMap<F>
where
    F: Fn(&[ArrayViewD<'_, f64>]) -> Result<Vec<ArrayD<f64>>> + Sync,
{
    pub fn new(fun: F) -> Self {
        Self {
            fun,
            in_axes: None,
            out_axes: None,
            settings: None,
        }
    }

    /// Batch axis of every argument, `None` for arguments passed through whole.
    pub fn in_axes(mut self, in_axes: Vec<Option<usize>>) -> Self {
        self.in_axes = Some(in_axes);
        self
    }

    /// Position of the batch axis in every output.
    pub fn out_axes(mut self, out_axes: Vec<usize>) -> Self {
        self.out_axes = Some(out_axes);
        self
    }

    /// Fix the chunking of this map. Without it every call reads
    /// [`get_mixed_map_iters`].
    pub fn settings(mut self, settings: MixedMapSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn call(&self, args: &[ArrayViewD<'_, f64>]) -> Result<Vec<ArrayD<f64>>> {
        let in_axes = match self.in_axes.as_ref() {
            Some(axes) if axes.len() != args.len() => {
                return Err(Error::Shape(format!(
                    "in_axes has {} entries for {} arguments",
                    axes.len(),
                    args.len()
                )))
            }
            Some(axes) => axes.clone(),
            None => vec![Some(0); args.len()],
        };

        let mut mapped = Vec::new();
        for (argnum, (arg, axis)) in args.iter().zip(in_axes.iter()).enumerate() {
            let Some(axis) = *axis else {
                continue;
            };
            if axis >= arg.ndim() {
                return Err(Error::Shape(format!(
                    "argument {argnum} has {} dimensions, cannot map over axis {axis}",
                    arg.ndim()
                )));
            }
            mapped.push((argnum, move_axis(arg.view(), axis, 0)));
        }

        let Some((_, first)) = mapped.first() else {
            return Err(Error::Shape("mixed map needs at least one mapped argument".to_string()));
        };
        let axis_size = first.len_of(Axis(0));
        if let Some((argnum, arg)) = mapped
            .iter()
            .find(|(_, arg)| arg.len_of(Axis(0)) != axis_size)
        {
            return Err(Error::Shape(format!(
                "argument {argnum} has {} elements along its mapped axis, expected {axis_size}",
                arg.len_of(Axis(0))
            )));
        }

        let settings = self.settings.unwrap_or_else(MixedMapSettings::from_global);
        let plan = ChunkPlan::new(axis_size, settings)?;
        log::debug!(
            "Mapping {} elements as {} sequential chunks of {} ({} padding rows)",
            plan.axis_size,
            plan.lmap_size,
            plan.vmap_size,
            plan.padding
        );

        let chunked = mapped
            .iter()
            .map(|(_, arg)| chunk_arg(arg.view(), &plan))
            .collect::<Result<Vec<_>>>()?;

        let mut chunk_outputs = Vec::with_capacity(plan.lmap_size);
        for chunk in 0..plan.lmap_size {
            let slices: Vec<ArrayViewD<'_, f64>> = chunked
                .iter()
                .map(|arg| arg.index_axis(Axis(0), chunk))
                .collect();
            let results = (0..plan.vmap_size)
                .into_par_iter()
                .map(|elem| {
                    let mut call_args: Vec<ArrayViewD<'_, f64>> =
                        args.iter().map(|arg| arg.view()).collect();
                    for ((argnum, _), slice) in mapped.iter().zip(slices.iter()) {
                        call_args[*argnum] = slice.index_axis(Axis(0), elem);
                    }
                    (self.fun)(&call_args)
                })
                .collect::<Result<Vec<_>>>()?;
            chunk_outputs.push(stack_outputs(results)?);
        }

        let num_outputs = chunk_outputs.first().map(Vec::len).unwrap_or(0);
        let out_axes = match self.out_axes.as_ref() {
            Some(axes) if axes.len() != num_outputs => {
                return Err(Error::Shape(format!(
                    "out_axes has {} entries for {num_outputs} outputs",
                    axes.len()
                )))
            }
            Some(axes) => axes.clone(),
            None => vec![0; num_outputs],
        };

        out_axes
            .iter()
            .enumerate()
            .map(|(k, &out_axis)| {
                let views: Vec<_> = chunk_outputs.iter().map(|out| out[k].view()).collect();
                let joined = concatenate(Axis(0), &views)?;
                if out_axis >= joined.ndim() {
                    return Err(Error::Shape(format!(
                        "output {k} has {} dimensions, cannot place the batch axis at {out_axis}",
                        joined.ndim()
                    )));
                }
                let truncated = joined.slice_axis(Axis(0), Slice::from(0..axis_size));
                Ok(move_axis(truncated, 0, out_axis)
                    .as_standard_layout()
                    .into_owned())
            })
            .collect()
    }
}
