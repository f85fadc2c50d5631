use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;

use crate::errors::dataset::{DatasetError, NotEnoughPatientsSnafu};

pub const DEFAULT_SPLIT_SEED: u64 = 42;
pub const DEFAULT_NUM_TEST_PATIENTS: usize = 13;

/// Patients assigned to training (and cross-validation) or to the held-out test set
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatientSplit {
    pub train: BTreeSet<String>,
    pub test: BTreeSet<String>,
}

impl PatientSplit {
    pub fn is_test(&self, patient_id: &str) -> bool {
        self.test.contains(patient_id)
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty() && self.test.is_empty()
    }
}

/// Shuffle the sorted patient ids with a seeded generator and hold out the first `num_test`.
pub fn split_patients<I, S>(
    patient_ids: I,
    num_test: usize,
    seed: u64,
) -> Result<PatientSplit, DatasetError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut patients = patient_ids
        .into_iter()
        .map(Into::into)
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect::<Vec<_>>();
    if patients.len() < num_test {
        return NotEnoughPatientsSnafu {
            requested: num_test,
            available: patients.len(),
        }
        .fail();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    patients.shuffle(&mut rng);
    let train = patients.split_off(num_test);
    tracing::info!(
        "Split {} patients into {} train and {} test",
        train.len() + patients.len(),
        train.len(),
        patients.len()
    );
    Ok(PatientSplit {
        train: train.into_iter().collect(),
        test: patients.into_iter().collect(),
    })
}
