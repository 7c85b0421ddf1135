/// quick start - enroll a student and collect their first month
use dojo_fees_rs::{
    FeeEngine, FeeType, MemoryStore, Money, PaymentCadence, PaymentMethod, PaymentRequest,
    SafeTimeProvider, Student, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::System);
    let mut engine = FeeEngine::new(MemoryStore::new());

    // configure pricing
    engine.set_fee_configuration(FeeType::Registration, Money::from_major(500), None, "admin", &time)?;
    engine.set_fee_configuration(FeeType::Monthly, Money::from_major(1_500), None, "admin", &time)?;

    // enroll a student on the monthly plan
    let student = Student::new("Aiko Tanaka");
    let student_id = student.id;
    engine.register_student(student)?;

    let enrollment = time.now().date_naive();
    let init = engine.initialize_student_fees(
        student_id,
        PaymentCadence::Monthly,
        enrollment,
        &time,
    )?;

    // pay the first monthly fee in full; the next period is generated
    if let Some(fee) = init.first_recurring_fee {
        let outcome = engine.record_payment(
            PaymentRequest {
                fee_id: fee.id,
                amount: fee.amount,
                method: PaymentMethod::Cash,
                receipt_number: Some("R-0001".to_string()),
                notes: None,
                recorded_by: "admin".to_string(),
            },
            &time,
        )?;
        if let Some(next) = outcome.next_fee {
            println!(
                "next invoice due {} for period {:?}..{:?}",
                next.due_date, next.period_start, next.period_end
            );
        }
    }

    // print the ledger
    println!("{}", engine.ledger_json(student_id, &time)?);

    Ok(())
}
