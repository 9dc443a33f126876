/// quick start - bill a student, post a payment, print the statement
use tuition_ledger_rs::{
    Classification, Department, FeeItem, InMemoryStore, LedgerConfig, Money, PaymentMethod,
    PaymentRequest, SafeTimeProvider, SchoolYear, Student, TimeSource, TuitionLedger, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let time = SafeTimeProvider::new(TimeSource::System);
    let store = InMemoryStore::new();
    let year = SchoolYear::new(2024);

    // one department, one student, two fee items
    let department = Department {
        id: Uuid::new_v4(),
        name: "Senior High".to_string(),
        classification: Classification::new("senior_high"),
    };
    let student = Student {
        id: Uuid::new_v4(),
        student_number: "2024-0001".to_string(),
        name: "Ana Reyes".to_string(),
        department_id: Some(department.id),
        program_id: None,
        year_level_id: None,
        section_id: None,
    };
    store.insert_department(department)?;
    store.insert_student(student.clone())?;
    store.upsert_fee_item(FeeItem::for_all("Tuition", year.clone(), Money::from_major(25_000)))?;
    store.upsert_fee_item(FeeItem::for_all("Miscellaneous", year.clone(), Money::from_major(3_500)))?;

    let ledger = TuitionLedger::new(store, LedgerConfig::standard())?;

    // pay a first installment in cash
    let receipt = ledger.post_payment(
        PaymentRequest {
            student_id: student.id,
            school_year: year.clone(),
            tendered: Money::from_major(10_000),
            payment_date: time.now().date_naive(),
            method: PaymentMethod::Cash,
            reference: None,
            recorded_by: "cashier-1".to_string(),
        },
        &time,
    )?;
    println!("balance after payment: {}", receipt.snapshot.balance);

    // print current statement
    println!("{}", ledger.statement(student.id, &year)?.to_json_pretty()?);

    Ok(())
}
