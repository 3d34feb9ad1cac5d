pub mod files;
pub mod init;
pub mod load;
pub mod role;
pub mod server;
pub mod table;
pub mod tablespace;
