//! Classification report

use std::fmt;

use serde::Serialize;

use clench_bci_core::types::Marker;

/// Precision, recall and F1 for one class
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ClassMetrics {
    /// TP / (TP + FP), 0 when nothing was predicted as this class
    pub precision: f64,
    /// TP / (TP + FN), 0 when the class is absent
    pub recall: f64,
    /// Harmonic mean of precision and recall
    pub f1: f64,
    /// True members of the class
    pub support: usize,
}

/// Per-class metrics plus a confusion matrix
#[derive(Clone, Debug, Serialize)]
pub struct ClassificationReport {
    /// Class labels, indexing every other field
    pub classes: Vec<Marker>,
    /// Metrics per class
    pub per_class: Vec<ClassMetrics>,
    /// Rows are true classes, columns predicted classes
    pub confusion: Vec<Vec<usize>>,
    /// Fraction predicted correctly
    pub accuracy: f64,
    /// Unweighted mean over classes
    pub macro_avg: ClassMetrics,
    /// Support-weighted mean over classes
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// Build from class indices into `classes`
    #[must_use]
    pub fn from_predictions(classes: &[Marker], truth: &[usize], predicted: &[usize]) -> Self {
        let k = classes.len();
        let mut confusion = vec![vec![0usize; k]; k];
        for (&t, &p) in truth.iter().zip(predicted) {
            if t < k && p < k {
                confusion[t][p] += 1;
            }
        }

        let per_class: Vec<ClassMetrics> = (0..k)
            .map(|c| {
                let tp = confusion[c][c] as f64;
                let predicted_c: usize = confusion.iter().map(|row| row[c]).sum();
                let support: usize = confusion[c].iter().sum();
                let precision = ratio(tp, predicted_c as f64);
                let recall = ratio(tp, support as f64);
                ClassMetrics {
                    precision,
                    recall,
                    f1: ratio(2.0 * precision * recall, precision + recall),
                    support,
                }
            })
            .collect();

        let total: usize = per_class.iter().map(|m| m.support).sum();
        let correct: usize = (0..k).map(|c| confusion[c][c]).sum();

        let average = |weight: &dyn Fn(&ClassMetrics) -> f64| {
            let w_sum: f64 = per_class.iter().map(weight).sum();
            let avg = |f: fn(&ClassMetrics) -> f64| {
                ratio(per_class.iter().map(|m| f(m) * weight(m)).sum(), w_sum)
            };
            ClassMetrics {
                precision: avg(|m| m.precision),
                recall: avg(|m| m.recall),
                f1: avg(|m| m.f1),
                support: total,
            }
        };
        let macro_avg = average(&|_| 1.0);
        let weighted_avg = average(&|m| m.support as f64);

        Self {
            classes: classes.to_vec(),
            per_class,
            confusion,
            accuracy: ratio(correct as f64, total as f64),
            macro_avg,
            weighted_avg,
        }
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>14} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        for (class, m) in self.classes.iter().zip(&self.per_class) {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                format!("marker {class}"),
                m.precision,
                m.recall,
                m.f1,
                m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "confusion (rows true, columns predicted):")?;
        for row in &self.confusion {
            let cells: Vec<String> = row.iter().map(|c| format!("{c:>5}")).collect();
            writeln!(f, "{}", cells.join(""))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<Marker> {
        vec![Marker::new(1).unwrap(), Marker::new(2).unwrap()]
    }

    #[test]
    fn test_hand_computed_case() {
        // truth:     0 0 0 0 1 1
        // predicted: 0 0 0 1 1 0
        let report = ClassificationReport::from_predictions(&markers(), &[0, 0, 0, 0, 1, 1], &[0, 0, 0, 1, 1, 0]);

        assert_eq!(report.confusion, vec![vec![3, 1], vec![1, 1]]);
        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);

        let c0 = report.per_class[0];
        assert!((c0.precision - 0.75).abs() < 1e-12);
        assert!((c0.recall - 0.75).abs() < 1e-12);
        assert_eq!(c0.support, 4);

        let c1 = report.per_class[1];
        assert!((c1.precision - 0.5).abs() < 1e-12);
        assert!((c1.recall - 0.5).abs() < 1e-12);
        assert!((c1.f1 - 0.5).abs() < 1e-12);

        assert!((report.macro_avg.f1 - 0.625).abs() < 1e-12);
        assert!((report.weighted_avg.f1 - (0.75 * 4.0 + 0.5 * 2.0) / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_never_predicted_class_has_zero_precision() {
        let report = ClassificationReport::from_predictions(&markers(), &[0, 1], &[0, 0]);
        assert_eq!(report.per_class[1].precision, 0.0);
        assert_eq!(report.per_class[1].f1, 0.0);
    }

    #[test]
    fn test_display_lists_every_class() {
        let report = ClassificationReport::from_predictions(&markers(), &[0, 1], &[0, 1]);
        let text = report.to_string();
        assert!(text.contains("marker 1"));
        assert!(text.contains("marker 2"));
        assert!(text.contains("accuracy"));
    }
}
