//! Measurement → Arrow transform.
//!
//! One `MeasurementBatch` accumulates a single entity's full result set
//! and produces one `RecordBatch` for the staging sink. Audit columns
//! (`ingested_at`, `updated_at`, `refreshed_at`) are stamped here with
//! the run's ingest instant; the merge layer relies on them.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use chrono::{DateTime, Utc};

use crate::page::Measurement;
use crate::sensors::Sensor;

const UTC_TZ: &str = "UTC";

fn utc_timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some(UTC_TZ.into()))
}

/// Destination schema for measurement rows.
pub fn measurement_schema() -> Schema {
    Schema::new(vec![
        Field::new("sensor_id", DataType::Int64, false),
        Field::new("location_id", DataType::Int64, false),
        Field::new("parameter", DataType::Utf8, false),
        Field::new("units", DataType::Utf8, true),
        Field::new("value", DataType::Float64, false),
        Field::new("datetime_from_utc", utc_timestamp_type(), true),
        Field::new("datetime_to_utc", utc_timestamp_type(), false),
        Field::new("datetime_from_local", DataType::Utf8, true),
        Field::new("datetime_to_local", DataType::Utf8, true),
        Field::new("coverage_percent", DataType::Float64, true),
        Field::new("ingested_at", utc_timestamp_type(), false),
        Field::new("updated_at", utc_timestamp_type(), false),
        Field::new("refreshed_at", utc_timestamp_type(), false),
    ])
}

/// Column accumulator for one entity's measurements.
pub struct MeasurementBatch {
    stamp_micros: i64,
    sensor_ids: Vec<i64>,
    location_ids: Vec<i64>,
    parameters: Vec<String>,
    units: Vec<Option<String>>,
    values: Vec<f64>,
    from_utc: Vec<Option<i64>>,
    to_utc: Vec<i64>,
    from_local: Vec<Option<String>>,
    to_local: Vec<Option<String>>,
    coverage: Vec<Option<f64>>,
}

impl MeasurementBatch {
    /// `stamp` becomes the value of all three audit columns.
    pub fn new(stamp: DateTime<Utc>) -> Self {
        Self {
            stamp_micros: stamp.timestamp_micros(),
            sensor_ids: Vec::new(),
            location_ids: Vec::new(),
            parameters: Vec::new(),
            units: Vec::new(),
            values: Vec::new(),
            from_utc: Vec::new(),
            to_utc: Vec::new(),
            from_local: Vec::new(),
            to_local: Vec::new(),
            coverage: Vec::new(),
        }
    }

    pub fn push(&mut self, sensor: &Sensor, m: &Measurement) {
        self.sensor_ids.push(sensor.id);
        self.location_ids.push(sensor.location_id);
        self.parameters.push(m.parameter.name.clone());
        self.units
            .push(m.parameter.units.clone().or_else(|| sensor.units.clone()));
        self.values.push(m.value);
        self.from_utc.push(
            m.period
                .datetime_from
                .as_ref()
                .map(|p| p.utc.timestamp_micros()),
        );
        self.to_utc.push(m.period.datetime_to.utc.timestamp_micros());
        self.from_local.push(
            m.period
                .datetime_from
                .as_ref()
                .and_then(|p| p.local.clone()),
        );
        self.to_local.push(m.period.datetime_to.local.clone());
        self.coverage
            .push(m.coverage.as_ref().and_then(|c| c.percent_complete));
    }

    pub fn len(&self) -> usize {
        self.sensor_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensor_ids.is_empty()
    }

    pub fn finish(self) -> Result<RecordBatch, ArrowError> {
        let rows = self.len();
        let stamp = TimestampMicrosecondArray::from(vec![self.stamp_micros; rows])
            .with_timezone(UTC_TZ);

        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(self.sensor_ids)),
            Arc::new(Int64Array::from(self.location_ids)),
            Arc::new(StringArray::from(self.parameters)),
            Arc::new(StringArray::from(self.units)),
            Arc::new(Float64Array::from(self.values)),
            Arc::new(TimestampMicrosecondArray::from(self.from_utc).with_timezone(UTC_TZ)),
            Arc::new(TimestampMicrosecondArray::from(self.to_utc).with_timezone(UTC_TZ)),
            Arc::new(StringArray::from(self.from_local)),
            Arc::new(StringArray::from(self.to_local)),
            Arc::new(Float64Array::from(self.coverage)),
            Arc::new(stamp.clone()),
            Arc::new(stamp.clone()),
            Arc::new(stamp),
        ];

        RecordBatch::try_new(Arc::new(measurement_schema()), columns)
    }
}
