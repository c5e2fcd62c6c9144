// src/cli.rs
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use workout_map_lib::{ActivityType, SortKey};

#[derive(Parser, Debug)]
#[command(author, version, about = "Log running and cycling workouts on a map", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Print workout lists as CSV instead of a table
    #[arg(long, global = true)]
    pub export_csv: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityTypeCli {
    Running,
    Cycling,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKeyCli {
    Distance,
    Duration,
}

pub const fn cli_activity_to_lib(value: ActivityTypeCli) -> ActivityType {
    match value {
        ActivityTypeCli::Running => ActivityType::Running,
        ActivityTypeCli::Cycling => ActivityType::Cycling,
    }
}

pub const fn cli_sort_to_lib(value: SortKeyCli) -> SortKey {
    match value {
        SortKeyCli::Distance => SortKey::Distance,
        SortKeyCli::Duration => SortKey::Duration,
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log a new workout at a location
    Add {
        /// Latitude of the workout location
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Longitude of the workout location
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Activity type
        #[arg(short, long = "type", value_enum)]
        type_: ActivityTypeCli,
        /// Distance in kilometers
        #[arg(short = 'k', long, allow_hyphen_values = true)]
        distance: String,
        /// Duration in minutes
        #[arg(short, long, allow_hyphen_values = true)]
        duration: String,
        /// Steps per minute (running)
        #[arg(short, long, allow_hyphen_values = true)]
        cadence: Option<String>,
        /// Elevation gain in meters (cycling); defaults to 0
        #[arg(short, long, allow_hyphen_values = true)]
        elevation: Option<String>,
    },
    /// Edit a workout; omitted values keep their current value
    Edit {
        /// ID of the workout to edit
        id: String,
        #[arg(short = 'k', long, allow_hyphen_values = true)]
        distance: Option<String>,
        #[arg(short, long, allow_hyphen_values = true)]
        duration: Option<String>,
        #[arg(short, long, allow_hyphen_values = true)]
        cadence: Option<String>,
        #[arg(short, long, allow_hyphen_values = true)]
        elevation: Option<String>,
    },
    /// Delete a workout
    Delete {
        /// ID of the workout to delete
        id: String,
    },
    /// List workouts
    List {
        /// Sort descending by this metric instead of insertion order
        #[arg(short, long, value_enum)]
        sort: Option<SortKeyCli>,
    },
    /// Show a workout and focus the map on it (counts as a visit)
    Show {
        /// ID of the workout to show
        id: String,
    },
    /// Show the area that contains every workout
    Fit,
    /// Delete every stored workout
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Start an interactive session
    Session,
    /// Set the zoom level used when focusing the map
    SetZoom { level: u8 },
    /// Set the header color of the workout table
    SetHeaderColor { color: String },
    /// Show the path to the database file
    DbPath,
    /// Show the path to the config file
    ConfigPath,
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// One line typed in an interactive session.
#[derive(Parser, Debug)]
#[command(multicall = true, disable_help_flag = true, disable_help_subcommand = true)]
pub struct SessionLine {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Open the form for a new workout at a location
    New {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lng: f64,
    },
    /// Choose the activity type of the open form
    Type {
        #[arg(value_enum)]
        activity: ActivityTypeCli,
    },
    /// Submit the open form: distance, duration, then cadence or elevation
    Submit {
        #[arg(allow_hyphen_values = true)]
        distance: String,
        #[arg(allow_hyphen_values = true)]
        duration: String,
        #[arg(allow_hyphen_values = true)]
        last: String,
    },
    /// Open the form pre-filled from a workout
    Edit { id: String },
    /// Close the form without saving
    Cancel,
    /// Delete a workout
    Delete { id: String },
    /// Toggle sorting by a metric
    Sort {
        #[arg(value_enum)]
        key: SortKeyCli,
    },
    /// Select a workout and focus the map on it
    Select { id: String },
    /// Show the workout list
    List,
    /// Show the area that contains every workout
    Fit,
    /// Delete every stored workout
    Reset,
    /// Show session commands
    Help,
    /// Leave the session
    #[command(alias = "exit")]
    Quit,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}

/// Parses a session line.
/// # Errors
/// Returns the clap error, which renders as a usage message.
pub fn parse_session_line(line: &str) -> Result<SessionCommand, clap::Error> {
    SessionLine::try_parse_from(line.split_whitespace()).map(|l| l.command)
}

pub fn session_help() -> String {
    SessionLine::command().render_help().to_string()
}
