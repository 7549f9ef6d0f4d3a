pub mod init;
pub mod serve;
pub mod simulate;
pub mod status;
