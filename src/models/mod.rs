pub mod movement;
pub mod product;
pub mod stock_record;
pub mod variant;
