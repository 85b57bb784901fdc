pub mod userdb;
