use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use patient_profile::models::{
    Appointment, Measurement, PatientId, PatientRecord, ProfileReport, Section,
};
use patient_profile::render;
use std::collections::BTreeSet;

fn month_of_vitals() -> ProfileReport {
    let start = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
    let measurements = (0..30 * 24)
        .flat_map(|hour| {
            let timestamp = start + Duration::hours(hour);
            [("heart_rate", 72.0), ("blood_pressure", 120.0)].map(|(field, value)| Measurement {
                patient: "Ahmed Mohamed".to_string(),
                field: field.to_string(),
                value,
                timestamp,
            })
        })
        .collect();

    ProfileReport {
        patient: PatientId::parse("Ahmed Mohamed").unwrap(),
        record: Section::ok(Some(PatientRecord {
            name: "Ahmed Mohamed".to_string(),
            age: 35,
            medical_history: vec!["Diabetes".to_string(), "High Blood Pressure".to_string()],
            region: "North".to_string(),
        })),
        appointments: Section::ok(vec![Appointment {
            patient_name: "Ahmed Mohamed".to_string(),
            date: "2025-05-20".to_string(),
            department: "Cardiology".to_string(),
        }]),
        measurements: Section::ok(measurements),
        doctors: Section::ok(BTreeSet::from(["Dr. Omar".to_string(), "Dr. Sara".to_string()])),
    }
}

fn bench_render(c: &mut Criterion) {
    let report = month_of_vitals();
    c.bench_function("render_month_of_vitals", |b| b.iter(|| render(black_box(&report))));
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
