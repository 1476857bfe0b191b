//! Feature relevance by mutual information

/// Mutual information (nats) between each feature column and the labels.
///
/// Each feature is discretised into `bins` equal-width bins over its
/// observed range. A constant feature scores zero.
#[must_use]
pub fn mutual_information(rows: &[Vec<f64>], targets: &[usize], bins: usize) -> Vec<f64> {
    let width = rows.first().map_or(0, Vec::len);
    let n_classes = targets.iter().max().map_or(0, |&m| m + 1);
    let bins = bins.max(1);
    let n = rows.len().min(targets.len());
    if n == 0 {
        return vec![0.0; width];
    }

    (0..width)
        .map(|j| {
            let column: Vec<f64> = rows[..n].iter().map(|r| r[j]).collect();
            let binned = discretise(&column, bins);

            let mut joint = vec![vec![0usize; n_classes]; bins];
            for (&b, &t) in binned.iter().zip(&targets[..n]) {
                joint[b][t] += 1;
            }
            information(&joint, n)
        })
        .collect()
}

fn discretise(values: &[f64], bins: usize) -> Vec<usize> {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;
    if !(span > 0.0) {
        return vec![0; values.len()];
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    values
        .iter()
        .map(|&v| (((v - lo) / span * bins as f64) as usize).min(bins - 1))
        .collect()
}

fn information(joint: &[Vec<usize>], n: usize) -> f64 {
    let n = n as f64;
    let p_x: Vec<f64> = joint.iter().map(|row| row.iter().sum::<usize>() as f64 / n).collect();
    let n_classes = joint.first().map_or(0, Vec::len);
    let p_y: Vec<f64> = (0..n_classes)
        .map(|c| joint.iter().map(|row| row[c]).sum::<usize>() as f64 / n)
        .collect();

    let mut mi = 0.0;
    for (x, row) in joint.iter().enumerate() {
        for (y, &count) in row.iter().enumerate() {
            if count > 0 {
                let p = count as f64 / n;
                mi += p * (p / (p_x[x] * p_y[y])).ln();
            }
        }
    }
    mi.max(0.0)
}
