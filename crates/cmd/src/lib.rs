// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod commands;
pub mod common;

pub use commands::files::{cat_command, ls_command, rm_command};
pub use commands::init::init_command;
pub use commands::load::{LoadOptions, LoadSummary, load_command};
pub use commands::role::role_create_command;
pub use commands::server::{
    server_create_command, server_drop_command, server_list_command, user_mapping_alter_command,
    user_mapping_create_command, user_mapping_drop_command,
};
pub use commands::table::{table_create_command, table_drop_command, table_list_command};
pub use commands::tablespace::{
    TablespaceCreate, tablespace_create_command, tablespace_drop_command, tablespace_grant_command,
    tablespace_list_command,
};
pub use common::Context;
