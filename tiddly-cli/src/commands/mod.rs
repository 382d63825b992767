pub mod stats;
pub mod tiddlers;
pub mod wikis;

pub use stats::run_stats;
pub use tiddlers::{build_tiddler, run_delete, run_get, run_list, run_peek, run_put};
pub use wikis::{run_init, run_new_wiki, run_templates, run_trash_wiki, run_wikis};
