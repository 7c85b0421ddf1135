/// billing cycle - deterministic walkthrough of a yearly plan with controlled time
use chrono::{Duration, TimeZone, Utc};
use dojo_fees_rs::{
    FeeEngine, FeeFilter, FeeStatus, FeeType, MemoryStore, Money, PaymentCadence, PaymentMethod,
    PaymentRequest, SafeTimeProvider, Student, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== billing cycle example ===\n");

    // controlled clock starting on enrollment day
    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 11, 27, 9, 0, 0).unwrap(),
    ));
    let controller = time.test_control().unwrap();

    let mut engine = FeeEngine::new(MemoryStore::new());
    engine.set_fee_configuration(FeeType::Registration, Money::from_major(500), None, "admin", &time)?;
    engine.set_fee_configuration(FeeType::Yearly, Money::from_major(15_000), None, "admin", &time)?;

    // enroll on the yearly plan
    let student = Student::new("Kenji Watanabe");
    let student_id = student.id;
    engine.register_student(student)?;

    let enrollment = time.now().date_naive();
    let init = engine.initialize_student_fees(student_id, PaymentCadence::Yearly, enrollment, &time)?;
    let yearly = init.first_recurring_fee.expect("yearly plan is priced");
    println!("enrolled on {}", enrollment);
    println!(
        "yearly fee covers {}..{}, due {}",
        yearly.period_start.unwrap(),
        yearly.period_end.unwrap(),
        yearly.due_date
    );

    // pay registration and the yearly fee up front
    for fee in [init.registration_fee.unwrap(), yearly.clone()] {
        engine.record_payment(
            PaymentRequest {
                fee_id: fee.id,
                amount: fee.amount,
                method: PaymentMethod::BankTransfer,
                receipt_number: None,
                notes: None,
                recorded_by: "admin".to_string(),
            },
            &time,
        )?;
    }
    println!("registration and yearly fee paid\n");

    // jump to just inside the renewal window (one month before period end)
    let window_open = time.now().date_naive() + Duration::days(335);
    controller.advance(Duration::days(335));
    println!("advanced to {}", window_open);

    // reading the ledger triggers the renewal
    let fees = engine.student_fees(student_id, FeeFilter::default(), &time)?;
    for fee in &fees {
        println!("  {} {} due {} -> {}", fee.fee_type, fee.amount, fee.due_date, fee.status);
    }
    let renewal = fees
        .iter()
        .find(|f| f.fee_type == FeeType::Yearly && f.status == FeeStatus::Pending)
        .expect("renewal generated inside the window");
    println!(
        "\nrenewal for {}..{} created automatically",
        renewal.period_start.unwrap(),
        renewal.period_end.unwrap()
    );

    // skip past the renewal due date without paying
    controller.advance(Duration::days(400));
    println!("\nadvanced to {}", time.now().date_naive());
    let fees = engine.student_fees(
        student_id,
        FeeFilter { status: Some(FeeStatus::Overdue), ..FeeFilter::default() },
        &time,
    )?;
    for fee in &fees {
        println!("overdue: {} {} was due {}", fee.fee_type, fee.amount, fee.due_date);
    }

    Ok(())
}
