//! Packing named, variable-length time series into fixed-length segments.
//!
//! [`batch`] stacks every series (optionally cut into overlapping segments)
//! into one zero-padded array with a validity mask and a label per row.
//! [`unbatch`] inverts it.

use std::collections::BTreeMap;

use itertools::Itertools;
use ndarray::{Array2, ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use serde::Serialize;

use crate::error::{Error, Result};

/// The slice `[start, end)` of series `name` that a batched row holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SegmentLabel {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl SegmentLabel {
    pub fn new(name: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSettings {
    /// Break every series into segments of this length. `None` keeps every
    /// series whole, padded to the longest one.
    pub seg_length: Option<usize>,
    /// Extra samples appended to every segment from the start of the next one.
    pub seg_overlap: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            seg_length: None,
            seg_overlap: 30,
        }
    }
}

/// Output of [`batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `(rows, seg_length + seg_overlap, ...)`
    pub data: ArrayD<f64>,
    /// `(rows, seg_length + seg_overlap)`, 1 for data and 0 for padding.
    pub mask: Array2<f64>,
    pub labels: Vec<SegmentLabel>,
}

/// Stack time series of different lengths into one zero-padded array.
///
/// The first axis of every series is time; all series must agree on the
/// remaining axes. `keys` selects and orders the series, by default all of
/// them in lexicographic order. Rows are emitted per key in order of
/// increasing start offset. A segment starting at `start` covers
/// `[start, min(start + seg_length + seg_overlap, len))`.
pub fn batch(
    data: &BTreeMap<String, ArrayD<f64>>,
    keys: Option<&[&str]>,
    settings: BatchSettings,
) -> Result<Batch> {
    let keys: Vec<&str> = match keys {
        Some(keys) => keys.to_vec(),
        None => data.keys().map(String::as_str).collect(),
    };

    let mut series = Vec::with_capacity(keys.len());
    for key in keys.iter() {
        let arr = data
            .get(*key)
            .ok_or_else(|| Error::Contract(format!("no series named {key:?}")))?;
        if arr.ndim() == 0 {
            return Err(Error::Shape(format!(
                "series {key:?} is a scalar, expected time along the first axis"
            )));
        }
        series.push((*key, arr));
    }

    let trailing: Vec<usize> = match series.first() {
        Some((_, arr)) => arr.shape()[1..].to_vec(),
        None => Vec::new(),
    };
    if let Some((key, arr)) = series.iter().find(|(_, arr)| arr.shape()[1..] != trailing[..]) {
        return Err(Error::Shape(format!(
            "series {key:?} has trailing shape {:?}, expected {trailing:?}",
            &arr.shape()[1..]
        )));
    }

    let seg_length = match settings.seg_length {
        Some(0) => return Err(Error::Config("segment length must be positive".to_string())),
        Some(len) => len,
        None => series
            .iter()
            .map(|(_, arr)| arr.len_of(Axis(0)))
            .max()
            .unwrap_or(0),
    };
    let row_length = seg_length + settings.seg_overlap;

    let mut labels = Vec::new();
    for (key, arr) in series.iter() {
        let len = arr.len_of(Axis(0));
        let mut start = 0;
        while start < len {
            let end = (start + row_length).min(len);
            labels.push(SegmentLabel::new(*key, start, end));
            start += seg_length;
        }
    }

    let mut shape = vec![labels.len(), row_length];
    shape.extend_from_slice(&trailing);
    let mut stacked = ArrayD::<f64>::zeros(IxDyn(&shape));
    let mut mask = Array2::<f64>::zeros((labels.len(), row_length));

    for (row, label) in labels.iter().enumerate() {
        let source = &data[&label.name];
        let len = label.len();
        stacked
            .index_axis_mut(Axis(0), row)
            .slice_axis_mut(Axis(0), Slice::from(0..len))
            .assign(&source.slice_axis(Axis(0), Slice::from(label.start..label.end)));
        mask.row_mut(row)
            .slice_axis_mut(Axis(0), Slice::from(0..len))
            .fill(1.);
    }

    log::debug!(
        "Batched {} series into {} rows of length {row_length}",
        series.len(),
        labels.len()
    );

    Ok(Batch {
        data: stacked,
        mask,
        labels,
    })
}

/// Reconstruct the named series from the rows of a [`batch`].
///
/// Every series is as long as the largest `end` among its labels. Rows are
/// written in label order, so where segments overlap the later row wins.
pub fn unbatch(
    data: ArrayViewD<'_, f64>,
    labels: &[SegmentLabel],
) -> Result<BTreeMap<String, ArrayD<f64>>> {
    if data.ndim() < 2 {
        return Err(Error::Shape(format!(
            "batched data needs a row and a time axis, got shape {:?}",
            data.shape()
        )));
    }
    if data.len_of(Axis(0)) != labels.len() {
        return Err(Error::Shape(format!(
            "{} rows of data but {} labels",
            data.len_of(Axis(0)),
            labels.len()
        )));
    }
    let row_length = data.len_of(Axis(1));
    if let Some(label) = labels
        .iter()
        .find(|label| label.end < label.start || label.len() > row_length)
    {
        return Err(Error::Shape(format!(
            "label {label:?} does not fit in rows of length {row_length}"
        )));
    }

    let trailing = &data.shape()[2..];
    let mut out = BTreeMap::new();
    for name in labels.iter().map(|label| &label.name).unique().sorted() {
        let length = labels
            .iter()
            .filter(|label| &label.name == name)
            .map(|label| label.end)
            .max()
            .unwrap_or(0);

        let mut shape = vec![length];
        shape.extend_from_slice(trailing);
        let mut seq = ArrayD::<f64>::zeros(IxDyn(&shape));

        for (label, row) in labels.iter().zip(data.axis_iter(Axis(0))) {
            if &label.name != name {
                continue;
            }
            seq.slice_axis_mut(Axis(0), Slice::from(label.start..label.end))
                .assign(&row.slice_axis(Axis(0), Slice::from(0..label.len())));
        }
        out.insert(name.clone(), seq);
    }
    Ok(out)
}
