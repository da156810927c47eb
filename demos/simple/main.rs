use featuresheet::Evaluate;

pub fn main() -> featuresheet::Result<()> {
    // Configure env_logger to see featuresheet logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("featuresheet")).init();

    // Reads SPREADSHEET_ID, SHEETS_API_KEY and friends. Fails if the initial configuration cannot
    // be fetched or built.
    let feature_sheet = featuresheet::FeatureSheetConfig::from_env()?.to_feature_sheet()?;

    let feature = std::env::args().nth(1).unwrap_or_else(|| "cta_color".to_owned());
    let entity = std::env::args().nth(2).unwrap_or_else(|| "user-42".to_owned());

    match feature_sheet.evaluate(&feature, Some(&entity)) {
        Ok(variant) if variant.is_unassigned() => {
            println!("{entity} is not enrolled in {feature}");
        }
        Ok(variant) => println!("{feature} for {entity}: {variant}"),
        Err(err) => println!("error evaluating {feature}: {err}"),
    }

    feature_sheet.shutdown()
}
