//! Scoring trained classifiers against a labelled dataset.

use crate::common::error::{ServeError, ServeResult};
use crate::data::domain::Dataset;
use crate::training::domain::Predictor;

use super::domain::EvalSuite;

/// Predict every row and tally the confusion matrix.
pub fn evaluate(model: &dyn Predictor, data: &Dataset) -> ServeResult<EvalSuite> {
    let n_classes = data.n_classes();
    let mut confusion = vec![vec![0usize; n_classes]; n_classes];
    let mut correct = 0;

    for (x, &truth) in data.features.iter().zip(&data.targets) {
        let predicted = model.predict(x)?;
        let row = &mut confusion[truth];
        let cell = row
            .get_mut(predicted)
            .ok_or(ServeError::UnknownClass(predicted))?;
        *cell += 1;
        if predicted == truth {
            correct += 1;
        }
    }

    Ok(EvalSuite {
        model: model.kind(),
        samples: data.len(),
        correct,
        confusion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::N_FEATURES;
    use crate::training::domain::ModelName;

    #[derive(Debug)]
    struct Constant(usize);

    impl Predictor for Constant {
        fn kind(&self) -> ModelName {
            ModelName::LogisticRegression
        }

        fn predict_proba(&self, _: &[f64; N_FEATURES]) -> ServeResult<Vec<f64>> {
            let mut p = vec![0.0; 4];
            p[self.0] = 1.0;
            Ok(p)
        }
    }

    fn three_rows() -> Dataset {
        let mut data = Dataset::default();
        data.push([5.0, 3.4, 1.5, 0.2], 0);
        data.push([5.9, 3.0, 4.2, 1.5], 1);
        data.push([6.9, 3.1, 5.4, 2.1], 2);
        data
    }

    #[test]
    fn constant_model_gets_one_class_right() {
        let suite = evaluate(&Constant(1), &three_rows()).unwrap();
        assert_eq!(suite.correct, 1);
        assert!((suite.accuracy() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(suite.confusion[0][1], 1);
        assert_eq!(suite.confusion[2][1], 1);
    }

    #[test]
    fn out_of_range_prediction_is_reported() {
        let err = evaluate(&Constant(3), &three_rows()).unwrap_err();
        assert!(matches!(err, ServeError::UnknownClass(3)));
    }
}
