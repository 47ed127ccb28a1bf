// Tipi condivisi con il backend REST
pub mod models;
