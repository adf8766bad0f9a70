//! Price band classification with k-nearest neighbours

use realty_price_core::cleaner::{remove_price_outliers, CleanReport};
use realty_price_core::config::AppConfig;
use realty_price_core::dataset::Dataset;
use realty_price_core::knn::{KnnClassifier, PriceCategory};
use realty_price_core::listing::Listing;
use realty_price_core::metrics::ClassificationReport;
use realty_price_core::split::{select, train_test_split};
use tracing::info;

use crate::errors::{Result, TrainerError};

/// Band metrics plus the outlier filter that ran before labelling
#[derive(Debug, Clone)]
pub struct Classification {
    pub report: ClassificationReport,
    pub clean: CleanReport,
}

/// Drop price outliers, band the rest, fit k-NN on the seeded training split
/// and score the held-out rows
pub fn classify(config: &AppConfig, dataset: &Dataset, k: usize) -> Result<Classification> {
    let (cleaned, clean) = remove_price_outliers(dataset.listings.clone())?;
    let (labelled, categories): (Vec<Listing>, Vec<PriceCategory>) = cleaned
        .into_iter()
        .filter_map(|l| PriceCategory::from_price(l.price).map(|c| (l, c)))
        .unzip();
    let split = train_test_split(labelled.len(), config.model.test_fraction, config.model.seed)?;
    if split.test.is_empty() {
        return Err(TrainerError::Dataset(
            "classification needs a non-empty test split".to_string(),
        ));
    }

    let train = select(&labelled, &split.train);
    let classifier = KnnClassifier::fit(&train, k)?;

    let actual: Vec<usize> = split.test.iter().map(|&i| categories[i].index()).collect();
    let predicted = split
        .test
        .iter()
        .map(|&i| classifier.predict(&labelled[i]).map(|c| c.index()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let labels: Vec<&str> = PriceCategory::ALL.iter().map(|c| c.name()).collect();
    let report = ClassificationReport::compute(&labels, &actual, &predicted)?;
    info!(
        "k-NN (k={}) accuracy {:.4} on {} test rows ({} outliers removed)",
        k,
        report.accuracy,
        actual.len(),
        clean.removed
    );
    Ok(Classification { report, clean })
}

#[cfg(test)]
mod tests {
    use super::*;
    use realty_price_core::dataset::LoadReport;
    use realty_price_core::listing::{NumericColumn, PropertyType};

    fn banded(n: usize) -> Dataset {
        let listings = (0..n)
            .map(|i| {
                let rooms = 1 + (i % 3) as u32;
                let price = match rooms {
                    1 => 500_000.0,
                    2 => 1_000_000.0,
                    _ => 2_000_000.0,
                };
                Listing::new(rooms, PropertyType::House, 3000, 5.0, price)
            })
            .collect();
        Dataset {
            listings,
            numeric_columns: vec![NumericColumn::Rooms, NumericColumn::Postcode, NumericColumn::Distance],
            report: LoadReport::default(),
        }
    }

    #[test]
    fn test_separable_bands() {
        let Classification { report, clean } = classify(&AppConfig::default(), &banded(60), 5).unwrap();
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.classes.len(), 3);
        assert_eq!(report.confusion.iter().flatten().sum::<usize>(), 12);
        assert_eq!(clean.removed, 0);
    }

    #[test]
    fn test_price_outliers_removed_before_banding() {
        let mut dataset = banded(60);
        for _ in 0..3 {
            dataset
                .listings
                .push(Listing::new(1, PropertyType::House, 3000, 5.0, 90_000_000.0));
        }

        let Classification { report, clean } = classify(&AppConfig::default(), &dataset, 5).unwrap();
        assert_eq!(clean.before, 63);
        assert_eq!(clean.removed, 3);
        assert_eq!(clean.retained(), 60);
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.confusion.iter().flatten().sum::<usize>(), 12);
    }

    #[test]
    fn test_requires_test_rows() {
        let mut config = AppConfig::default();
        config.model.test_fraction = 0.0;
        assert!(classify(&config, &banded(30), 5).is_err());
    }
}
