use clap::{Args, Parser, Subcommand, ValueEnum};
use recur_core::models::{Frequency, SeriesStatus};

/// Recurring appointment series for clinics: create, inspect, adjust and check for conflicts
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create a new recurring series
    Create(CreateCommand),
    /// List series
    List(ListCommand),
    /// Show a series with its exceptions and upcoming occurrences
    Show(ShowCommand),
    /// List occurrences of a series in a date window
    Occurrences(OccurrencesCommand),
    /// Skip a single occurrence
    Skip(SkipCommand),
    /// Move a single occurrence to another date or time
    Reschedule(RescheduleCommand),
    /// Change service details of a single occurrence
    Modify(ModifyCommand),
    /// Remove the exception on a date, restoring the regular occurrence
    Unskip(UnskipCommand),
    /// Change a series, either entirely or from a date on
    Update(UpdateCommand),
    /// Set the last date of a series
    End(EndCommand),
    /// Cancel a series
    Cancel(CancelCommand),
    /// Pause a series
    Pause(IdCommand),
    /// Resume a paused series
    Resume(IdCommand),
    /// Check the remaining schedule of a series for conflicts
    Conflicts(ConflictsCommand),
    /// Manage provider working hours
    Hours(HoursCommand),
    /// Manage existing bookings used for conflict checks
    Booking(BookingCommand),
}

/// Repetition frequency
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyArg {
    /// Every day
    Daily,
    /// Every week
    Weekly,
    /// Every other week
    Biweekly,
    /// Every month
    Monthly,
}

impl From<FrequencyArg> for Frequency {
    fn from(arg: FrequencyArg) -> Self {
        match arg {
            FrequencyArg::Daily => Frequency::Daily,
            FrequencyArg::Weekly => Frequency::Weekly,
            FrequencyArg::Biweekly => Frequency::Biweekly,
            FrequencyArg::Monthly => Frequency::Monthly,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusArg {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl From<StatusArg> for SeriesStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => SeriesStatus::Active,
            StatusArg::Paused => SeriesStatus::Paused,
            StatusArg::Completed => SeriesStatus::Completed,
            StatusArg::Cancelled => SeriesStatus::Cancelled,
        }
    }
}

/// Which occurrences an update applies to
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeArg {
    /// The whole series
    All,
    /// Occurrences from --from on; earlier ones keep their details
    Future,
}

#[derive(Parser, Debug, Clone)]
pub struct CreateCommand {
    /// Patient the series is booked for
    #[arg(long)]
    pub patient: String,
    /// Provider performing the service
    #[arg(long)]
    pub provider: String,
    /// Service identifier
    #[arg(long)]
    pub service: String,
    /// Human-readable service name
    #[arg(long)]
    pub service_name: String,
    /// Appointment length in minutes
    #[arg(long, default_value = "60")]
    pub duration: u32,
    #[arg(long)]
    pub room: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,

    /// Repetition frequency
    #[arg(long, value_enum)]
    pub every: FrequencyArg,
    /// Repeat every N periods
    #[arg(long, default_value = "1")]
    pub interval: u32,
    /// First date of the series (e.g., '2025-08-04', 'next monday')
    #[arg(long)]
    pub start: String,
    /// Time of day (e.g., '10:00', '2:30 PM')
    #[arg(long)]
    pub at: String,
    /// Days of week (mon,tue,wed,thu,fri,sat,sun)
    #[arg(long)]
    pub on: Option<String>,
    /// Day of month for monthly series
    #[arg(long, conflicts_with = "on")]
    pub month_day: Option<u32>,
    /// Which matching weekday in the month (1..5, or -1 for the last)
    #[arg(long, requires = "on", allow_hyphen_values = true)]
    pub set_pos: Option<i32>,
    /// Last date an occurrence may fall on
    #[arg(long)]
    pub until: Option<String>,
    /// Total number of occurrences
    #[arg(long)]
    pub count: Option<u32>,

    /// Skip conflict detection
    #[arg(long)]
    pub no_conflict_check: bool,
    /// Maximum number of conflicts to report
    #[arg(long)]
    pub max_conflicts: Option<usize>,
}

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    #[arg(long)]
    pub patient: Option<String>,
    #[arg(long)]
    pub provider: Option<String>,
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,
    /// Page number, starting at 1
    #[arg(long, default_value = "1")]
    pub page: u32,
    /// Series per page
    #[arg(long, default_value = "20")]
    pub limit: u32,
}

#[derive(Parser, Debug, Clone)]
pub struct IdCommand {
    /// Series ID or unique ID prefix
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    /// Series ID or unique ID prefix
    pub id: String,
    /// Number of upcoming occurrences to show
    #[arg(long, short, default_value = "5")]
    pub upcoming: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct OccurrencesCommand {
    /// Series ID or unique ID prefix
    pub id: String,
    /// First original date of the window (defaults to today)
    #[arg(long)]
    pub from: Option<String>,
    /// Last original date of the window (defaults to 30 days after --from)
    #[arg(long)]
    pub to: Option<String>,
    /// Also list skipped occurrences
    #[arg(long)]
    pub include_skipped: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct SkipCommand {
    /// Series ID or unique ID prefix
    pub id: String,
    /// Original date of the occurrence
    #[arg(long)]
    pub on: String,
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct RescheduleCommand {
    /// Series ID or unique ID prefix
    pub id: String,
    /// Original date of the occurrence
    #[arg(long)]
    pub on: String,
    /// New date
    #[arg(long)]
    pub to: String,
    /// New time of day
    #[arg(long)]
    pub at: Option<String>,
    /// Provider for this occurrence only
    #[arg(long)]
    pub provider: Option<String>,
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ModifyCommand {
    /// Series ID or unique ID prefix
    pub id: String,
    /// Original date of the occurrence
    #[arg(long)]
    pub on: String,
    #[arg(long)]
    pub service: Option<String>,
    #[arg(long)]
    pub service_name: Option<String>,
    #[arg(long)]
    pub duration: Option<u32>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long)]
    pub provider: Option<String>,
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct UnskipCommand {
    /// Series ID or unique ID prefix
    pub id: String,
    /// Original date of the occurrence
    #[arg(long)]
    pub on: String,
}

#[derive(Parser, Debug, Clone)]
pub struct UpdateCommand {
    /// Series ID or unique ID prefix
    pub id: String,

    /// How to apply changes
    #[arg(long, value_enum, default_value = "all")]
    pub scope: ScopeArg,
    /// First date affected by a future-scoped update
    #[arg(long, required_if_eq("scope", "future"))]
    pub from: Option<String>,

    #[arg(long)]
    pub provider: Option<String>,
    #[arg(long)]
    pub service: Option<String>,
    #[arg(long)]
    pub service_name: Option<String>,
    #[arg(long)]
    pub duration: Option<u32>,

    #[arg(long)]
    pub room: Option<String>,
    #[arg(long, conflicts_with = "room")]
    pub room_clear: bool,

    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long, conflicts_with = "notes")]
    pub notes_clear: bool,

    /// New time of day
    #[arg(long)]
    pub at: Option<String>,

    #[arg(long)]
    pub until: Option<String>,
    #[arg(long, conflicts_with = "until")]
    pub until_clear: bool,

    #[arg(long)]
    pub count: Option<u32>,
    #[arg(long, conflicts_with = "count")]
    pub count_clear: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct EndCommand {
    /// Series ID or unique ID prefix
    pub id: String,
    /// Last date an occurrence may fall on
    #[arg(long)]
    pub on: String,
}

#[derive(Parser, Debug, Clone)]
pub struct CancelCommand {
    /// Series ID or unique ID prefix
    pub id: String,
    #[arg(long)]
    pub reason: Option<String>,
    /// Cancel without confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ConflictsCommand {
    /// Series ID or unique ID prefix
    pub id: String,
    /// Maximum number of conflicts to report
    #[arg(long)]
    pub max: Option<usize>,
}

#[derive(Parser, Debug, Clone)]
pub struct HoursCommand {
    #[command(subcommand)]
    pub command: HoursSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum HoursSubcommand {
    /// Set or clear a provider's hours on some weekdays
    Set(SetHoursCommand),
    /// Show a provider's weekly hours
    List(ListHoursCommand),
}

#[derive(Args, Debug, Clone)]
pub struct SetHoursCommand {
    pub provider: String,
    /// Days of week (mon,tue,wed,thu,fri,sat,sun)
    #[arg(long)]
    pub days: String,
    #[arg(long, required_unless_present = "off")]
    pub start: Option<String>,
    #[arg(long, required_unless_present = "off")]
    pub end: Option<String>,
    /// Mark the provider as not working on these days
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub off: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ListHoursCommand {
    pub provider: String,
}

#[derive(Parser, Debug, Clone)]
pub struct BookingCommand {
    #[command(subcommand)]
    pub command: BookingSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BookingSubcommand {
    /// Record an existing booking
    Add(AddBookingCommand),
    /// Mark a booking as cancelled
    Cancel(CancelBookingCommand),
}

#[derive(Args, Debug, Clone)]
pub struct AddBookingCommand {
    /// Booking identifier
    pub id: String,
    #[arg(long)]
    pub provider: String,
    #[arg(long)]
    pub patient: String,
    /// Start (e.g., '2025-08-04 10:30')
    #[arg(long)]
    pub start: String,
    /// Length in minutes
    #[arg(long, default_value = "60")]
    pub duration: u32,
    #[arg(long)]
    pub room: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CancelBookingCommand {
    /// Booking identifier
    pub id: String,
}
