//src/main.rs
mod cli;

use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use std::io::{self, stdin, stdout, Write};
use tracing_subscriber::EnvFilter;

use workout_map_lib::{
    color_names, ActivityType, AppService, ControllerError, Coords, Effect, FormMode,
    FormPrefill, RawFields, Workout, WorkoutId,
};

fn main() -> Result<()> {
    init_logging();

    let cli_args = cli::parse_args();
    let export_csv = cli_args.export_csv;

    if let cli::Commands::Completion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();
        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    let mut service =
        AppService::initialize().context("Failed to initialize application service")?;

    match cli_args.command {
        cli::Commands::Completion { .. } => {
            unreachable!("Completion generation should have exited already");
        }
        cli::Commands::Add {
            lat,
            lng,
            type_,
            distance,
            duration,
            cadence,
            elevation,
        } => {
            let activity = cli::cli_activity_to_lib(type_);
            let raw = RawFields {
                distance,
                duration,
                cadence: cadence.unwrap_or_default(),
                elevation_gain: elevation.unwrap_or_else(|| "0".to_string()),
            };
            service.controller.pick_location(Coords::new(lat, lng));
            match service.controller.submit_new(activity, &raw) {
                Ok(effects) => {
                    for id in rendered_ids(&effects) {
                        let workout = service.require_workout(id)?;
                        println!(
                            "Successfully added workout: {} {} ID: {}",
                            activity.emoji(),
                            workout.description(),
                            workout.id()
                        );
                        print_workout_summary(workout);
                    }
                }
                Err(e) => bail!("Error adding workout: {e}"),
            }
        }
        cli::Commands::Edit {
            id,
            distance,
            duration,
            cadence,
            elevation,
        } => {
            let id = WorkoutId::new(id);
            let effects = service
                .controller
                .begin_edit(&id)
                .with_context(|| format!("Error editing workout ID {id}"))?;
            let Some(FormPrefill {
                locked_activity: Some(activity),
                fields,
            }) = prefill_of(effects)
            else {
                bail!("Workout ID {id} could not be opened for editing");
            };
            let raw = RawFields {
                distance: distance.unwrap_or(fields.distance),
                duration: duration.unwrap_or(fields.duration),
                cadence: cadence.unwrap_or(fields.cadence),
                elevation_gain: elevation.unwrap_or(fields.elevation_gain),
            };
            match service.controller.submit_edit(&id, activity, &raw) {
                Ok(_) => {
                    println!("Successfully updated workout ID {id}.");
                    print_workout_summary(service.require_workout(&id)?);
                }
                Err(e) => bail!("Error editing workout ID {id}: {e}"),
            }
        }
        cli::Commands::Delete { id } => {
            let id = WorkoutId::new(id);
            match service.controller.delete(&id) {
                Ok(effects) if effects.is_empty() => {
                    println!("No workout with ID {id}; nothing deleted.");
                }
                Ok(_) => println!("Successfully deleted workout ID {id}."),
                Err(e) => bail!("Error deleting workout ID {id}: {e}"),
            }
        }
        cli::Commands::List { sort } => {
            if let Some(key) = sort {
                service.controller.toggle_sort(cli::cli_sort_to_lib(key));
            }
            let view = service.controller.view();
            if view.is_empty() {
                println!("No workouts logged yet.");
            } else if export_csv {
                print_workout_csv(&view)?;
            } else {
                print_workout_table(&view, service.config.header_color());
            }
        }
        cli::Commands::Show { id } => {
            let id = WorkoutId::new(id);
            let effects = service.controller.select_workout(&id);
            if effects.is_empty() {
                bail!(ControllerError::NotFound(id));
            }
            if let Some(workout) = service.controller.selected() {
                print_workout_summary(workout);
            }
            for effect in &effects {
                print_focus(effect);
            }
        }
        cli::Commands::Fit => print_bounds(service.controller.bounds()),
        cli::Commands::Reset { yes } => {
            if !yes && !confirm("Delete every stored workout? This cannot be undone. (y/N): ")? {
                println!("Reset cancelled.");
                return Ok(());
            }
            service
                .controller
                .reset()
                .context("Failed to reset stored workouts")?;
            println!("All workouts deleted.");
        }
        cli::Commands::Session => run_session(&mut service)?,
        cli::Commands::SetZoom { level } => {
            service.set_map_zoom_level(level)?;
            println!("Map zoom level set to {level}.");
        }
        cli::Commands::SetHeaderColor { color } => match service.set_header_color(&color) {
            Ok(()) => println!("Header color set to {}.", service.config.theme.header_color),
            Err(e) => bail!("{e} Valid colors: {}", color_names().join(", ")),
        },
        cli::Commands::DbPath => println!("Database file is located at: {:?}", service.get_db_path()),
        cli::Commands::ConfigPath => {
            println!("Config file is located at: {:?}", service.get_config_path());
        }
    }

    Ok(())
}

/// Logs go to stderr so table and CSV output stay clean. `RUST_LOG` overrides
/// the default `warn` level.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn prefill_of(effects: Vec<Effect>) -> Option<FormPrefill> {
    effects.into_iter().find_map(|effect| match effect {
        Effect::ShowForm(prefill) => Some(prefill),
        _ => None,
    })
}

fn rendered_ids(effects: &[Effect]) -> impl Iterator<Item = &WorkoutId> {
    effects.iter().filter_map(|effect| match effect {
        Effect::RenderWorkout(id) => Some(id),
        _ => None,
    })
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question}");
    stdout().flush()?;
    let mut input = String::new();
    stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

// --- Interactive session ---

/// The form as the session sees it: which activity is selected and whether
/// the selector is locked by an edit.
struct SessionForm {
    activity: ActivityType,
    locked: bool,
}

fn run_session(service: &mut AppService) -> Result<()> {
    println!("Interactive session. Type 'help' for commands, 'quit' to leave.");
    render_effect(service, &Effect::RenderAll);

    let mut form = SessionForm {
        activity: ActivityType::Running,
        locked: false,
    };
    loop {
        print!("{}", session_prompt(service.controller.mode(), &form));
        stdout().flush()?;
        let mut line = String::new();
        if stdin().read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let command = match cli::parse_session_line(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let result = match command {
            cli::SessionCommand::Quit => break,
            cli::SessionCommand::Help => {
                println!("{}", cli::session_help());
                continue;
            }
            cli::SessionCommand::List => Ok(vec![Effect::RenderAll]),
            cli::SessionCommand::Fit => {
                print_bounds(service.controller.bounds());
                continue;
            }
            cli::SessionCommand::Type { activity } => {
                if form.locked {
                    println!("The activity type cannot be changed while editing.");
                } else {
                    form.activity = cli::cli_activity_to_lib(activity);
                }
                continue;
            }
            cli::SessionCommand::New { lat, lng } => {
                Ok(service.controller.pick_location(Coords::new(lat, lng)))
            }
            cli::SessionCommand::Submit {
                distance,
                duration,
                last,
            } => {
                let raw = match form.activity {
                    ActivityType::Running => RawFields::running(&distance, &duration, &last),
                    ActivityType::Cycling => RawFields::cycling(&distance, &duration, &last),
                };
                service.controller.submit(form.activity, &raw)
            }
            cli::SessionCommand::Edit { id } => service.controller.begin_edit(&WorkoutId::new(id)),
            cli::SessionCommand::Cancel => Ok(service.controller.cancel()),
            cli::SessionCommand::Delete { id } => service.controller.delete(&WorkoutId::new(id)),
            cli::SessionCommand::Sort { key } => {
                Ok(service.controller.toggle_sort(cli::cli_sort_to_lib(key)))
            }
            cli::SessionCommand::Select { id } => {
                Ok(service.controller.select_workout(&WorkoutId::new(id)))
            }
            cli::SessionCommand::Reset => {
                if confirm("Delete every stored workout? (y/N): ")? {
                    service.controller.reset()
                } else {
                    continue;
                }
            }
        };

        match result {
            Ok(effects) => {
                for effect in &effects {
                    if let Effect::ShowForm(prefill) = effect {
                        form.locked = prefill.locked_activity.is_some();
                        if let Some(activity) = prefill.locked_activity {
                            form.activity = activity;
                        }
                    }
                    if *effect == Effect::HideForm {
                        form.locked = false;
                    }
                    render_effect(service, effect);
                }
            }
            Err(e) => println!("⚠️  {e}"),
        }
    }
    Ok(())
}

fn session_prompt(mode: &FormMode, form: &SessionForm) -> String {
    match mode {
        FormMode::Idle => "> ".to_string(),
        FormMode::Creating { coords } => format!("new {} @ {coords}> ", form.activity),
        FormMode::Editing { id } => format!("edit {} {id}> ", form.activity),
    }
}

fn render_effect(service: &AppService, effect: &Effect) {
    match effect {
        Effect::ShowForm(prefill) => {
            let f = &prefill.fields;
            match prefill.locked_activity {
                Some(activity) => println!(
                    "Editing {activity} workout: distance {} km, duration {} min, {} {}",
                    f.distance,
                    f.duration,
                    match activity {
                        ActivityType::Running => &f.cadence,
                        ActivityType::Cycling => &f.elevation_gain,
                    },
                    activity.effort_unit()
                ),
                None => println!("New workout form open. Use 'type' and 'submit'."),
            }
        }
        Effect::HideForm => println!("Form closed."),
        Effect::RenderWorkout(id) => {
            if let Some(workout) = service.controller.find(id) {
                print_workout_summary(workout);
            }
        }
        Effect::RenderMarker(id) => {
            if let Some(workout) = service.controller.find(id) {
                println!(
                    "📍 {} {} at {}",
                    workout.activity_type().emoji(),
                    workout.description(),
                    workout.coords()
                );
            }
        }
        Effect::RenderAll => {
            let view = service.controller.view();
            if view.is_empty() {
                println!("No workouts logged yet.");
            } else {
                print_workout_table(&view, service.config.header_color());
            }
        }
        Effect::FocusMap { .. } => print_focus(effect),
        Effect::Persisted => {}
    }
}

// --- Output helpers ---

fn print_focus(effect: &Effect) {
    if let Effect::FocusMap { coords, zoom } = effect {
        println!("Map centered on {coords} (zoom {zoom})");
    }
}

fn print_bounds(bounds: Option<(Coords, Coords)>) {
    match bounds {
        Some((south_west, north_east)) => {
            println!("All workouts lie between {south_west} and {north_east}");
        }
        None => println!("No workouts logged yet."),
    }
}

fn print_workout_summary(workout: &Workout) {
    let activity = workout.activity_type();
    println!(
        "{} {} | {} km | ⏱ {} min | ⚡️ {:.1} {} | {} {} | visits: {}",
        activity.emoji(),
        workout.description(),
        workout.distance(),
        workout.duration(),
        workout.rate(),
        activity.rate_unit(),
        workout.effort(),
        activity.effort_unit(),
        workout.visit_count()
    );
}

/// Prints workouts in a formatted table.
fn print_workout_table(workouts: &[&Workout], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(header_color),
            Cell::new("Workout").fg(header_color),
            Cell::new("Location").fg(header_color),
            Cell::new("Distance (km)").fg(header_color),
            Cell::new("Duration (min)").fg(header_color),
            Cell::new("Pace / Speed").fg(header_color),
            Cell::new("Cadence / Elevation").fg(header_color),
            Cell::new("Visits").fg(header_color),
        ]);

    for workout in workouts {
        let activity = workout.activity_type();
        table.add_row(vec![
            Cell::new(workout.id()),
            Cell::new(format!("{} {}", activity.emoji(), workout.description())),
            Cell::new(workout.coords()),
            Cell::new(workout.distance()),
            Cell::new(workout.duration()),
            Cell::new(format!("{:.1} {}", workout.rate(), activity.rate_unit())),
            Cell::new(format!("{} {}", workout.effort(), activity.effort_unit())),
            Cell::new(workout.visit_count()),
        ]);
    }
    println!("{table}");
}

fn print_workout_csv(workouts: &[&Workout]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record([
        "ID",
        "Created_UTC",
        "Type",
        "Description",
        "Latitude",
        "Longitude",
        "Distance_km",
        "Duration_min",
        "Pace_min_per_km",
        "Speed_km_per_h",
        "Cadence_spm",
        "Elevation_m",
        "Visits",
    ])?;

    for workout in workouts {
        let coords = workout.coords();
        writer.write_record(&[
            workout.id().to_string(),
            workout.created_at().to_rfc3339(),
            workout.activity_type().to_string(),
            workout.description().to_string(),
            coords.lat.to_string(),
            coords.lng.to_string(),
            workout.distance().to_string(),
            workout.duration().to_string(),
            workout.pace().map_or(String::new(), |p| format!("{p:.2}")),
            workout.speed().map_or(String::new(), |s| format!("{s:.2}")),
            workout.cadence().map_or(String::new(), |c| c.to_string()),
            workout
                .elevation_gain()
                .map_or(String::new(), |e| e.to_string()),
            workout.visit_count().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
