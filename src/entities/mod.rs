pub mod concentration;
pub mod effect_list;
pub mod living;
