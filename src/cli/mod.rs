pub mod args;
pub mod doctor;
pub mod record;

pub use args::{Cli, CliCommand, DoctorCliArgs, RecordCliArgs};
pub use doctor::{handle_doctor_command, AudioRouteReport};
pub use record::handle_record_command;
