// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use diagnostics::log_error;

use cmd::{Context, LoadOptions, TablespaceCreate};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "dirtable")]
struct Cli {
    /// Home directory holding dirtable.yaml and catalog.json (default: $DIRTABLE_HOME)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Role to run the command as
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the configuration and an empty catalog
    Init {
        /// Root of the local file areas (default: <home>/data)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Manage roles
    #[command(subcommand)]
    Role(RoleCommand),
    /// Manage storage servers for DFS tablespaces
    #[command(subcommand)]
    Server(ServerCommand),
    /// Manage per-role options on a storage server
    #[command(subcommand)]
    UserMapping(UserMappingCommand),
    /// Manage tablespaces
    #[command(subcommand)]
    Tablespace(TablespaceCommand),
    /// Manage directory tables
    #[command(subcommand)]
    Table(TableCommand),
    /// Load a file, or every file under a directory, into a directory table
    Load {
        table: String,
        source: PathBuf,
        /// Directory inside the table to load under
        #[arg(long)]
        dest_path: Option<String>,
        /// Tag recorded on every loaded row
        #[arg(long)]
        tag: Option<String>,
        /// Abort the whole load at the first failing file
        #[arg(long)]
        stop_on_error: bool,
    },
    /// List the files of a directory table
    Ls { table: String },
    /// Print a file given its scoped URL (/<tablespace>/<path>)
    Cat { url: String },
    /// Remove a file from a directory table
    Rm { table: String, path: String },
}

#[derive(Subcommand)]
enum RoleCommand {
    Create {
        name: String,
        #[arg(long)]
        superuser: bool,
    },
}

#[derive(Subcommand)]
enum ServerCommand {
    Create {
        name: String,
        /// YAML file of server options (protocol, endpoint, ...)
        #[arg(long)]
        options: Option<PathBuf>,
        #[arg(long)]
        if_not_exists: bool,
    },
    Drop {
        name: String,
        #[arg(long)]
        if_exists: bool,
    },
    List,
}

#[derive(Subcommand)]
enum UserMappingCommand {
    Create {
        server: String,
        /// Role the mapping applies to (default: PUBLIC)
        #[arg(long = "for")]
        role: Option<String>,
        /// YAML file of user options (accesskey, secretkey, ...)
        #[arg(long)]
        options: Option<PathBuf>,
    },
    Alter {
        server: String,
        #[arg(long = "for")]
        role: Option<String>,
        /// YAML file of options to set; an empty value removes the option
        #[arg(long)]
        options: Option<PathBuf>,
    },
    Drop {
        server: String,
        #[arg(long = "for")]
        role: Option<String>,
        #[arg(long)]
        if_exists: bool,
    },
}

#[derive(Subcommand)]
enum TablespaceCommand {
    Create {
        name: String,
        /// Absolute directory, or /bucket/workdir for a DFS tablespace
        location: String,
        #[arg(long)]
        owner: Option<String>,
        /// Storage server; makes this a DFS tablespace
        #[arg(long)]
        server: Option<String>,
        /// File handler as "library,symbol"
        #[arg(long)]
        handler: Option<String>,
        /// YAML file of additional tablespace options
        #[arg(long)]
        options: Option<PathBuf>,
    },
    Drop {
        name: String,
        #[arg(long)]
        if_exists: bool,
    },
    List,
    /// Grant CREATE on a tablespace
    Grant { name: String, role: String },
}

#[derive(Subcommand)]
enum TableCommand {
    Create {
        name: String,
        /// Directory of the table's files inside the tablespace
        location: String,
        #[arg(long)]
        tablespace: Option<String>,
        #[arg(long)]
        temporary: bool,
    },
    Drop {
        name: String,
        #[arg(long)]
        if_exists: bool,
    },
    List,
}

fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let ctx = Context::new(cli.home, cli.user);

    match cli.command {
        Commands::Init { data_dir } => cmd::init_command(&ctx, data_dir, out),
        Commands::Role(RoleCommand::Create { name, superuser }) => {
            cmd::role_create_command(&ctx, &name, superuser, out)
        }
        Commands::Server(command) => match command {
            ServerCommand::Create {
                name,
                options,
                if_not_exists,
            } => cmd::server_create_command(&ctx, &name, options.as_deref(), if_not_exists, out),
            ServerCommand::Drop { name, if_exists } => {
                cmd::server_drop_command(&ctx, &name, if_exists, out)
            }
            ServerCommand::List => cmd::server_list_command(&ctx, out),
        },
        Commands::UserMapping(command) => match command {
            UserMappingCommand::Create {
                server,
                role,
                options,
            } => cmd::user_mapping_create_command(
                &ctx,
                &server,
                role.as_deref(),
                options.as_deref(),
                out,
            ),
            UserMappingCommand::Alter {
                server,
                role,
                options,
            } => cmd::user_mapping_alter_command(
                &ctx,
                &server,
                role.as_deref(),
                options.as_deref(),
                out,
            ),
            UserMappingCommand::Drop {
                server,
                role,
                if_exists,
            } => cmd::user_mapping_drop_command(&ctx, &server, role.as_deref(), if_exists, out),
        },
        Commands::Tablespace(command) => match command {
            TablespaceCommand::Create {
                name,
                location,
                owner,
                server,
                handler,
                options,
            } => {
                let args = TablespaceCreate {
                    name: &name,
                    location: &location,
                    owner: owner.as_deref(),
                    server: server.as_deref(),
                    handler: handler.as_deref(),
                    options_file: options.as_deref(),
                };
                cmd::tablespace_create_command(&ctx, &args, out)
            }
            TablespaceCommand::Drop { name, if_exists } => {
                cmd::tablespace_drop_command(&ctx, &name, if_exists, out)
            }
            TablespaceCommand::List => cmd::tablespace_list_command(&ctx, out),
            TablespaceCommand::Grant { name, role } => {
                cmd::tablespace_grant_command(&ctx, &name, &role, out)
            }
        },
        Commands::Table(command) => match command {
            TableCommand::Create {
                name,
                location,
                tablespace,
                temporary,
            } => cmd::table_create_command(&ctx, &name, &location, tablespace.as_deref(), temporary, out),
            TableCommand::Drop { name, if_exists } => {
                cmd::table_drop_command(&ctx, &name, if_exists, out)
            }
            TableCommand::List => cmd::table_list_command(&ctx, out),
        },
        Commands::Load {
            table,
            source,
            dest_path,
            tag,
            stop_on_error,
        } => {
            let options = LoadOptions {
                dest_path: dest_path.as_deref(),
                tag: tag.as_deref(),
                stop_on_error,
            };
            cmd::load_command(&ctx, &table, &source, &options, out).map(|_| ())
        }
        Commands::Ls { table } => cmd::ls_command(&ctx, &table, out),
        Commands::Cat { url } => cmd::cat_command(&ctx, &url, out),
        Commands::Rm { table, path } => cmd::rm_command(&ctx, &table, &path, out),
    }
}

fn main() -> Result<()> {
    diagnostics::init_diagnostics();

    let cli = Cli::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = run(cli, &mut out);
    if let Err(err) = &result {
        log_error!("Command failed: {error}", error: format!("{err:#}"));
    }
    out.flush()?;
    result
}
