/*!
Provider modules: locating them on disk and loading them.
*/

pub mod loader;
pub mod resolver;

pub use loader::{LibLoader, ModuleHandle, ModuleLoader};
pub use resolver::{module_file_name, resolve_module_path};
