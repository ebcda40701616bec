use chrono::Local;
use dotenv::dotenv;
use log::{error, info};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use yaog::utils::grades::get_grades;
use yaog::utils::schedule::get_schedule_of_week;
use yaog::utils::session::Session;

fn main() {
    // Loads environment variables from a `.env` file, if present.
    dotenv().ok();

    // Initializes logging with simplelog to the terminal with mixed output (both stdout and stderr) and automatic color support.
    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto
    ).unwrap();

    let username = std::env::var("OGE_USERNAME").expect("OGE_USERNAME environment variable not found");
    let password = std::env::var("OGE_PASSWORD").expect("OGE_PASSWORD environment variable not found");

    // Opens an authenticated session against the portal.
    let session = match Session::login(&username, &password) {
        Ok(session) => session,
        Err(e) => {
            error!("Error logging in: {}", e);
            return;
        },
    };

    // Rebuilds the full grade tree, one request per collapsed folder row.
    let grades = match get_grades(&session) {
        Ok(grades) => {
            info!("Grades retrieved successfully");
            grades
        },
        Err(e) => {
            error!("Error retrieving grades: {}", e);
            return;
        },
    };
    println!("{}", serde_json::to_string_pretty(&grades).unwrap());

    // Fetches the time slots of the current week.
    let schedule = match get_schedule_of_week(&session, Local::now().naive_local()) {
        Ok(schedule) => {
            info!("Schedule retrieved successfully");
            schedule
        },
        Err(e) => {
            error!("Error retrieving schedule: {}", e);
            return;
        },
    };
    println!("{}", serde_json::to_string_pretty(&schedule).unwrap());
}
