use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "clawfleet", version, about = "Mission board and agent supervisor for a game-agent fleet")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the board, launch the configured agents and supervise them until Ctrl-C
    Run(RunArgs),
    /// Inspect or edit the mission board
    Board(BoardArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// YAML fleet configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Mark agents running without launching processes
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Clone)]
pub struct BoardArgs {
    /// YAML fleet configuration file (for the state path and seed)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Board state file, overriding the configuration
    #[arg(long, global = true)]
    pub state_file: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: BoardCommand,
}

#[derive(Subcommand, Clone)]
pub enum BoardCommand {
    /// Print the whole board
    Show,
    /// List open missions in claim order
    Open,
    /// Add a system mission
    Add {
        /// What needs doing
        task: String,
        /// low, normal or high
        #[arg(long, default_value = "normal")]
        priority: String,
        /// Explicit mission id
        #[arg(long)]
        id: Option<String>,
        /// Mission ids this one waits on
        #[arg(long, value_delimiter = ',')]
        depends_on: Vec<String>,
    },
    /// Add a viewer mission backed by a tip
    Tip {
        task: String,
        #[arg(long)]
        tipper: Option<String>,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        priority: Option<String>,
    },
    /// Claim a mission for an agent
    Claim {
        agent: String,
        /// Specific mission; the best open mission when omitted
        #[arg(long)]
        mission: Option<String>,
    },
    /// Hand a claimed mission back to the board
    Release {
        agent: String,
        mission: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Mark a mission done
    Complete {
        agent: String,
        mission: String,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Mark a mission failed
    Fail {
        agent: String,
        mission: String,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Mark a mission blocked
    Block {
        agent: String,
        mission: String,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Replace the board with the configured seed
    Reset,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}
