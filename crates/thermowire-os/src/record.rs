use std::fmt::Debug;

use serde::Serialize;

use thermowire_drivers::ds18b20::{Ds18b20Error, Temperature};

/// The outcome of a single temperature transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRecord {
    /// Position of the sample in the polling sequence, starting from 0.
    pub sequence: u64,
    /// Raw temperature register, absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<i16>,
    /// Temperature in degrees Celsius, absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub celsius: Option<f32>,
    /// Failure description, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SampleRecord {
    pub(crate) fn new<E: Debug>(
        sequence: u64,
        result: &Result<Temperature, Ds18b20Error<E>>,
    ) -> Self {
        match result {
            Ok(temperature) => Self {
                sequence,
                raw: Some(temperature.raw()),
                celsius: Some(temperature.celsius()),
                error: None,
            },
            Err(e) => Self {
                sequence,
                raw: None,
                celsius: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Whether the transaction succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Serializes the record as a single line of `JSON`.
    ///
    /// # Errors
    ///
    /// Fails if the record cannot be serialized.
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

/// Totals of a polling run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct PollSummary {
    /// Transactions performed.
    pub samples: u64,
    /// Transactions that failed.
    pub failures: u64,
    /// Last successful reading in degrees Celsius.
    pub last_celsius: Option<f32>,
}

impl PollSummary {
    pub(crate) fn add(&mut self, record: &SampleRecord) {
        self.samples += 1;
        match record.celsius {
            Some(celsius) => self.last_celsius = Some(celsius),
            None => self.failures += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    #[test]
    fn successful_record() {
        let result: Result<_, Ds18b20Error<Infallible>> = Ok(Temperature::from_raw(0x0191));
        let record = SampleRecord::new(3, &result);

        assert!(record.is_ok());
        assert_eq!(record.raw, Some(0x0191));
        assert_eq!(
            record.to_json().unwrap(),
            r#"{"sequence":3,"raw":401,"celsius":25.0625}"#
        );
    }

    #[test]
    fn failed_record() {
        let result: Result<Temperature, _> = Err(Ds18b20Error::<Infallible>::NoPresence);
        let record = SampleRecord::new(0, &result);

        assert!(!record.is_ok());
        assert_eq!(
            record.to_json().unwrap(),
            r#"{"sequence":0,"error":"sensor not detected"}"#
        );
    }

    #[test]
    fn summary_counts_failures() {
        let ok: Result<_, Ds18b20Error<Infallible>> = Ok(Temperature::from_raw(-162));
        let failed: Result<Temperature, _> = Err(Ds18b20Error::<Infallible>::NoPresence);

        let mut summary = PollSummary::default();
        summary.add(&SampleRecord::new(0, &ok));
        summary.add(&SampleRecord::new(1, &failed));

        assert_eq!(summary.samples, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.last_celsius, Some(-10.125));
    }
}
