pub mod footer;
pub mod header;
pub mod icons;
pub mod utils;

pub use footer::draw_footer;
pub use header::draw_header;
pub use icons::{category_style, filter_label, rating_stars};
pub use utils::{ensure_valid_selection, time_ago, truncate};
