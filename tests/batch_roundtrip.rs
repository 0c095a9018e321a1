use std::collections::BTreeMap;

use anyhow::Result;
use moseq_sampling::{batch, unbatch, BatchSettings, SegmentLabel};
use ndarray::{Array3, ArrayD, Axis};
use pretty_assertions::assert_eq;

fn recordings() -> BTreeMap<String, ArrayD<f64>> {
    [("a", 137), ("b", 42)]
        .into_iter()
        .map(|(name, len)| {
            let offset = if name == "a" { 0. } else { 1000. };
            let arr = Array3::from_shape_fn((len, 4, 2), |(t, k, d)| {
                offset + (t * 8 + k * 2 + d) as f64
            });
            (name.to_string(), arr.into_dyn())
        })
        .collect()
}

#[test]
fn round_trip_under_segmentations() -> Result<()> {
    let data = recordings();
    for (seg_length, seg_overlap) in [(50, 0), (50, 10), (1000, 0)] {
        let settings = BatchSettings {
            seg_length: Some(seg_length),
            seg_overlap,
        };
        let batched = batch(&data, None, settings)?;
        assert_eq!(batched.data.shape()[1], seg_length + seg_overlap);
        assert_eq!(&batched.data.shape()[2..], &[4, 2]);
        assert_eq!(batched.mask.nrows(), batched.labels.len());

        // mask counts exactly the data each row carries
        let valid: f64 = batched.mask.sum();
        let carried: usize = batched.labels.iter().map(SegmentLabel::len).sum();
        assert_eq!(valid, carried as f64);

        let restored = unbatch(batched.data.view(), &batched.labels)?;
        assert_eq!(restored, data);
    }
    Ok(())
}

#[test]
fn segment_counts() -> Result<()> {
    let data = recordings();
    let batched = batch(
        &data,
        None,
        BatchSettings {
            seg_length: Some(50),
            seg_overlap: 10,
        },
    )?;
    let starts: Vec<(&str, usize, usize)> = batched
        .labels
        .iter()
        .map(|label| (label.name.as_str(), label.start, label.end))
        .collect();
    assert_eq!(
        starts,
        vec![
            ("a", 0, 60),
            ("a", 50, 110),
            ("a", 100, 137),
            ("b", 0, 42),
        ]
    );
    // the last row of "b" is zero beyond its data
    let last = batched.data.index_axis(Axis(0), 3);
    assert!(last
        .slice_axis(Axis(0), ndarray::Slice::from(42..))
        .iter()
        .all(|&x| x == 0.));
    Ok(())
}

#[test]
fn whole_series_when_unsegmented() -> Result<()> {
    let data = recordings();
    let batched = batch(
        &data,
        Some(&["b", "a"]),
        BatchSettings {
            seg_length: None,
            seg_overlap: 0,
        },
    )?;
    assert_eq!(batched.data.shape(), &[2, 137, 4, 2]);
    assert_eq!(
        batched.labels,
        vec![SegmentLabel::new("b", 0, 42), SegmentLabel::new("a", 0, 137)]
    );
    assert_eq!(unbatch(batched.data.view(), &batched.labels)?, data);
    Ok(())
}
