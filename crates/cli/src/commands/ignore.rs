use anyhow::Result;
use photoindex_core::Library;

fn print(folders: &[String]) {
    if folders.is_empty() {
        println!("No ignored folders.");
    }
    for folder in folders {
        println!("  {folder}");
    }
}

pub fn list(library: &Library) -> Result<()> {
    print(&library.ignore_folders()?);
    Ok(())
}

pub fn add(library: &Library, fragment: &str) -> Result<()> {
    print(&library.add_ignore_folder(fragment)?);
    Ok(())
}

pub fn rm(library: &Library, fragment: &str) -> Result<()> {
    print(&library.remove_ignore_folder(fragment)?);
    Ok(())
}
