use of_types::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("ObjectiveFunction parameter example");

    // A float parameter on a grid of 0.25 and an integer parameter
    let width = Parameter::float(1.0, 0.0, 10.0, 0.25)?;
    let layers = Parameter::int(3, 1, 8)?;
    println!("width schema: {}", serde_json::to_string(&width.schema())?);
    println!("layers schema: {}", serde_json::to_string(&layers.schema())?);

    // Encode a few values and decode them again
    for value in [0.0, 0.3, 4.125, 9.99] {
        let code = width.transform(ParameterValue::Float(value))?;
        let snapped = width.inv_transform(code)?;
        println!("width {value} -> code {code} -> {snapped}");
    }

    let code = layers.transform(ParameterValue::Int(5))?;
    println!("layers 5 -> code {code}");

    // Out of range values are rejected
    match width.transform(ParameterValue::Float(12.0)) {
        Ok(code) => println!("unexpected code {code}"),
        Err(e) => println!("rejected: {e}"),
    }

    println!("run states in order:");
    for state in [
        LookupState::New,
        LookupState::Provisional,
        LookupState::Configured,
        LookupState::Active,
        LookupState::Completed,
    ] {
        println!("  {state} accepts result: {}", state.accepts_result());
    }

    Ok(())
}
