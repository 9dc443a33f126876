/// payment allocation - old balances are paid before the current year
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use tuition_ledger_rs::{
    Classification, Department, FeeItem, Grant, InMemoryStore, LedgerConfig, Money, PaymentMethod,
    PaymentRequest, SafeTimeProvider, SchoolYear, Student, TimeSource, TuitionLedger, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== payment allocation example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 8, 15, 9, 0, 0).unwrap()));
    let last_year = SchoolYear::new(2023);
    let this_year = SchoolYear::new(2024);

    let store = InMemoryStore::new();
    let college = Department {
        id: Uuid::new_v4(),
        name: "College of Nursing".to_string(),
        classification: Classification::new("college"),
    };
    let student = Student {
        id: Uuid::new_v4(),
        student_number: "2023-0456".to_string(),
        name: "Marco Santos".to_string(),
        department_id: Some(college.id),
        program_id: None,
        year_level_id: None,
        section_id: None,
    };
    store.insert_department(college)?;
    store.insert_student(student.clone())?;
    store.upsert_fee_item(FeeItem::for_all("Tuition", last_year.clone(), Money::from_major(2_000)))?;
    store.upsert_fee_item(FeeItem::for_all("Tuition", this_year.clone(), Money::from_major(20_000)))?;

    let scholarship = Grant::percentage("Dean's lister", dec!(25));
    store.insert_grant(scholarship.clone())?;

    let ledger = TuitionLedger::new(store, LedgerConfig::standard())?;
    // enrolled last year, never paid
    ledger.open_ledger(student.id, &last_year, &time)?;

    let assignment = ledger.assign_grant(student.id, scholarship.id, &this_year, &time)?;
    println!("scholarship discount: {}", assignment.discount_amount);

    let previous = ledger.previous_balance(student.id, &this_year)?;
    let current = ledger.snapshot(student.id, &this_year)?;
    println!("previous years owe: {}", previous);
    println!("{} owes:       {}\n", this_year, current.balance);

    // 20,000 tendered against 2,000 old + 15,000 current
    let receipt = ledger.post_payment(
        PaymentRequest {
            student_id: student.id,
            school_year: this_year.clone(),
            tendered: Money::from_major(20_000),
            payment_date: time.now().date_naive(),
            method: PaymentMethod::BankTransfer,
            reference: Some("BT-88213".to_string()),
            recorded_by: "cashier-2".to_string(),
        },
        &time,
    )?;

    let allocation = &receipt.allocation;
    println!("applied to previous: {}", allocation.previous_paid);
    println!("applied to current:  {}", allocation.current_paid);
    println!("change returned:     {}", allocation.change);
    println!("status now:          {:?}", receipt.snapshot.status);
    println!("previous years owe:  {}", ledger.previous_balance(student.id, &this_year)?);
    println!("{} status:    {:?}", last_year, ledger.snapshot(student.id, &last_year)?.status);

    for event in ledger.take_events()? {
        println!("event: {:?}", event);
    }

    Ok(())
}
