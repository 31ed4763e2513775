//! Named-index contraction of two dense tensors.
//!
//! Subscripts follow the `"ab,bc->ac"` convention: one lowercase ASCII letter
//! per axis, exactly two operands and an explicit output. A label that appears
//! in the output and in both operands is a batch index; a label missing from
//! the output is summed over.

use ndarray::{Array3, ArrayD, ArrayViewD, Axis, CowArray, IxDyn, Zip};

use crate::error::TensorError;

#[derive(Debug, PartialEq)]
struct Subscripts {
    a: Vec<char>,
    b: Vec<char>,
    out: Vec<char>,
}

fn parse_labels(part: &str, subscripts: &str) -> Result<Vec<char>, TensorError> {
    let labels: Vec<char> = part.trim().chars().collect();
    if let Some(c) = labels.iter().find(|c| !c.is_ascii_lowercase()) {
        return Err(TensorError::InvalidSubscripts(format!(
            "'{}' contains invalid label '{}'",
            subscripts, c
        )));
    }
    for (i, c) in labels.iter().enumerate() {
        if labels[..i].contains(c) {
            return Err(TensorError::InvalidSubscripts(format!(
                "'{}' repeats label '{}' within one term",
                subscripts, c
            )));
        }
    }
    Ok(labels)
}

fn parse_subscripts(subscripts: &str) -> Result<Subscripts, TensorError> {
    let (inputs, out) = subscripts.split_once("->").ok_or_else(|| {
        TensorError::InvalidSubscripts(format!("'{}' has no '->'", subscripts))
    })?;
    let (a, b) = inputs.split_once(',').ok_or_else(|| {
        TensorError::InvalidSubscripts(format!("'{}' must name exactly two operands", subscripts))
    })?;

    let parsed = Subscripts {
        a: parse_labels(a, subscripts)?,
        b: parse_labels(b, subscripts)?,
        out: parse_labels(out, subscripts)?,
    };

    if let Some(c) = parsed.out.iter().find(|c| !parsed.a.contains(c) && !parsed.b.contains(c)) {
        return Err(TensorError::InvalidSubscripts(format!(
            "output label '{}' does not appear in any operand of '{}'",
            c, subscripts
        )));
    }
    Ok(parsed)
}

fn check_operand(labels: &[char], shape: &[usize], operand: &str) -> Result<(), TensorError> {
    if labels.len() != shape.len() {
        return Err(TensorError::InvalidDimension(format!(
            "operand {} has {} axes but {} labels",
            operand,
            shape.len(),
            labels.len()
        )));
    }
    Ok(())
}

// Sums away every axis whose label fails `keep`, returning the surviving labels.
fn reduce_private_axes<'a>(
    operand: ArrayViewD<'a, f32>,
    labels: &[char],
    keep: impl Fn(char) -> bool,
) -> (CowArray<'a, f32, IxDyn>, Vec<char>) {
    let mut reduced = CowArray::from(operand);
    let mut kept = labels.to_vec();
    for k in (0..labels.len()).rev() {
        if !keep(labels[k]) {
            reduced = CowArray::from(reduced.sum_axis(Axis(k)));
            kept.remove(k);
        }
    }
    (reduced, kept)
}

fn positions(order: &[char], labels: &[char]) -> Vec<usize> {
    order
        .iter()
        .map(|c| labels.iter().position(|x| x == c).unwrap_or(0))
        .collect()
}

// Permutes `operand` to `order` and flattens it to (batch, rows, cols).
fn as_batched_matrix(
    operand: &CowArray<'_, f32, IxDyn>,
    labels: &[char],
    order: &[char],
    split: (usize, usize),
) -> Result<Array3<f32>, TensorError> {
    let permuted = operand.view().permuted_axes(IxDyn(&positions(order, labels)));
    let dims = permuted.shape().to_vec();
    let batch: usize = dims[..split.0].iter().product();
    let rows: usize = dims[split.0..split.1].iter().product();
    let cols: usize = dims[split.1..].iter().product();
    Ok(permuted
        .as_standard_layout()
        .into_owned()
        .into_shape((batch, rows, cols))?)
}

/// Contract `a` and `b` according to `subscripts`.
///
/// Labels owned by one operand and absent from the output are summed first.
/// The remaining axes are permuted into `(batch, free, contracted)` and
/// `(batch, contracted, free)` matrices, multiplied with one `dot` per batch
/// entry, and permuted into output order. The result is in standard layout.
pub fn contract(
    subscripts: &str,
    a: ArrayViewD<'_, f32>,
    b: ArrayViewD<'_, f32>,
) -> Result<ArrayD<f32>, TensorError> {
    let spec = parse_subscripts(subscripts)?;
    check_operand(&spec.a, a.shape(), "a")?;
    check_operand(&spec.b, b.shape(), "b")?;

    for (j, c) in spec.b.iter().enumerate() {
        if let Some(i) = spec.a.iter().position(|x| x == c) {
            if a.shape()[i] != b.shape()[j] {
                return Err(TensorError::ShapeMismatch(format!(
                    "label '{}' has size {} but operand b gives {}",
                    c,
                    a.shape()[i],
                    b.shape()[j]
                )));
            }
        }
    }

    let (a, a_labels) =
        reduce_private_axes(a, &spec.a, |c| spec.out.contains(&c) || spec.b.contains(&c));
    let (b, b_labels) =
        reduce_private_axes(b, &spec.b, |c| spec.out.contains(&c) || spec.a.contains(&c));

    let shared: Vec<char> = a_labels.iter().filter(|c| b_labels.contains(c)).copied().collect();
    let batch: Vec<char> = shared.iter().filter(|c| spec.out.contains(c)).copied().collect();
    let summed: Vec<char> = shared.iter().filter(|c| !spec.out.contains(c)).copied().collect();
    let free_a: Vec<char> = a_labels.iter().filter(|c| !shared.contains(c)).copied().collect();
    let free_b: Vec<char> = b_labels.iter().filter(|c| !shared.contains(c)).copied().collect();

    let a_order: Vec<char> = [&batch[..], &free_a[..], &summed[..]].concat();
    let b_order: Vec<char> = [&batch[..], &summed[..], &free_b[..]].concat();
    let a3 = as_batched_matrix(&a, &a_labels, &a_order, (batch.len(), batch.len() + free_a.len()))?;
    let b3 = as_batched_matrix(&b, &b_labels, &b_order, (batch.len(), batch.len() + summed.len()))?;

    let mut product = Array3::<f32>::zeros((a3.shape()[0], a3.shape()[1], b3.shape()[2]));
    Zip::from(product.outer_iter_mut())
        .and(a3.outer_iter())
        .and(b3.outer_iter())
        .for_each(|mut dst, lhs, rhs| dst.assign(&lhs.dot(&rhs)));

    let size_of = |c: &char| match a_labels.iter().position(|x| x == c) {
        Some(i) => a.shape()[i],
        None => b.shape()[b_labels.iter().position(|x| x == c).unwrap_or(0)],
    };
    let mid_labels: Vec<char> = [&batch[..], &free_a[..], &free_b[..]].concat();
    let mid_dims: Vec<usize> = mid_labels.iter().map(size_of).collect();

    let result = product
        .into_shape(IxDyn(&mid_dims))?
        .permuted_axes(IxDyn(&positions(&spec.out, &mid_labels)));
    Ok(result.as_standard_layout().into_owned())
}
