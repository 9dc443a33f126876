/// overdue batch - flag every college student still owing after the deadline
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use tuition_ledger_rs::{
    Classification, Department, FeeItem, InMemoryStore, LedgerConfig, Money, OverdueFilter,
    PaymentMethod, PaymentRequest, SafeTimeProvider, SchoolYear, Student, TimeSource, TuitionLedger,
    Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== overdue batch example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 8, 1, 8, 0, 0).unwrap()));
    let controller = time.test_control().unwrap();
    let year = SchoolYear::new(2024);

    let store = InMemoryStore::new();
    let college = Department {
        id: Uuid::new_v4(),
        name: "College of Business".to_string(),
        classification: Classification::new("college"),
    };
    store.insert_department(college.clone())?;
    store.upsert_fee_item(FeeItem::for_all("Tuition", year.clone(), Money::from_major(18_000)))?;

    let mut students = Vec::new();
    for n in 1..=4 {
        let student = Student {
            id: Uuid::new_v4(),
            student_number: format!("2024-{:04}", n),
            name: format!("Student {}", n),
            department_id: Some(college.id),
            program_id: None,
            year_level_id: None,
            section_id: None,
        };
        store.insert_student(student.clone())?;
        students.push(student);
    }

    let ledger = TuitionLedger::new(store, LedgerConfig::standard())?;

    // enrollment payments; the last student pays in full
    for (i, student) in students.iter().enumerate() {
        let amount = if i == students.len() - 1 { 18_000 } else { 5_000 * (i as i64 + 1) };
        ledger.post_payment(
            PaymentRequest {
                student_id: student.id,
                school_year: year.clone(),
                tendered: Money::from_major(amount),
                payment_date: time.now().date_naive(),
                method: PaymentMethod::Cash,
                reference: None,
                recorded_by: "cashier-1".to_string(),
            },
            &time,
        )?;
    }

    // deadline passes
    let due = NaiveDate::from_ymd_opt(2024, 10, 31).unwrap();
    controller.advance(Duration::days(100));
    println!("today: {}", time.now().format("%Y-%m-%d"));

    let filter = OverdueFilter {
        classification: Some(Classification::new("college")),
        ..OverdueFilter::for_year(year.clone())
    };
    let report = ledger.bulk_mark_overdue(&filter, due, &time)?;
    println!("marked overdue: {}", report.affected());
    for failure in &report.failed {
        println!("skipped {}: {}", failure.student_id, failure.error);
    }
    println!();

    for student in &students {
        let snapshot = ledger.snapshot(student.id, &year)?;
        println!("{}  balance {:>10}  {:?}", student.student_number, snapshot.balance.to_string(), snapshot.status);
    }

    // first student settles and gets the flag cleared
    let first = &students[0];
    let owed = ledger.snapshot(first.id, &year)?.balance;
    ledger.post_payment(
        PaymentRequest {
            student_id: first.id,
            school_year: year.clone(),
            tendered: owed,
            payment_date: time.now().date_naive(),
            method: PaymentMethod::Cash,
            reference: None,
            recorded_by: "cashier-1".to_string(),
        },
        &time,
    )?;
    let cleared = ledger.clear_overdue(first.id, &year, &time)?;
    println!("\n{} after settling: {:?}", first.student_number, cleared.status);

    Ok(())
}
