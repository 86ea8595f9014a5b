use std::path::PathBuf;

use crate::package::host::ConfigurationDirectory;

#[derive(Debug, Clone)]
pub struct ConfigItem {
    pub dir: ConfigurationDirectory,
    pub checked: bool,
}

/// Checkable list of discovered configuration directories.
#[derive(Debug, Clone, Default)]
pub struct ConfigList {
    pub items: Vec<ConfigItem>,
    pub selected: usize,
}

impl ConfigList {
    /// Every directory starts checked.
    pub fn new(dirs: Vec<ConfigurationDirectory>) -> Self {
        Self {
            items: dirs
                .into_iter()
                .map(|dir| ConfigItem { dir, checked: true })
                .collect(),
            selected: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.items.is_empty() {
            self.selected = 0;
            return;
        }

        let max = self.items.len().saturating_sub(1) as isize;
        let next = (self.selected as isize + delta).clamp(0, max);
        self.selected = next as usize;
    }

    pub fn toggle_selected(&mut self) {
        if let Some(item) = self.items.get_mut(self.selected) {
            item.checked = !item.checked;
        }
    }

    /// Check everything, or uncheck everything if all are already checked.
    pub fn toggle_all(&mut self) {
        let check = !self.items.iter().all(|item| item.checked);
        for item in &mut self.items {
            item.checked = check;
        }
    }

    pub fn checked_count(&self) -> usize {
        self.items.iter().filter(|item| item.checked).count()
    }

    /// Checked directories in list order.
    pub fn checked_paths(&self) -> Vec<PathBuf> {
        self.items
            .iter()
            .filter(|item| item.checked)
            .map(|item| item.dir.path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::host::HostVersion;

    fn list(names: &[&str]) -> ConfigList {
        ConfigList::new(
            names
                .iter()
                .map(|name| ConfigurationDirectory {
                    path: PathBuf::from("/home/u").join(name),
                    version: HostVersion::parse(name).unwrap(),
                    supported: true,
                })
                .collect(),
        )
    }

    #[test]
    fn starts_fully_checked_in_listing_order() {
        let configs = list(&["houdini20.5", "houdini19.5"]);
        assert_eq!(configs.checked_count(), 2);
        assert_eq!(
            configs.checked_paths(),
            [
                PathBuf::from("/home/u/houdini20.5"),
                PathBuf::from("/home/u/houdini19.5")
            ]
        );
    }

    #[test]
    fn selection_is_clamped() {
        let mut configs = list(&["houdini20.5", "houdini19.5"]);
        configs.move_selection(5);
        assert_eq!(configs.selected, 1);
        configs.move_selection(-9);
        assert_eq!(configs.selected, 0);

        let mut empty = ConfigList::default();
        empty.move_selection(1);
        empty.toggle_selected();
        assert_eq!(empty.selected, 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn toggling_changes_checked_paths() {
        let mut configs = list(&["houdini20.5", "houdini19.5", "houdini20.0"]);
        configs.move_selection(1);
        configs.toggle_selected();
        assert_eq!(
            configs.checked_paths(),
            [
                PathBuf::from("/home/u/houdini20.5"),
                PathBuf::from("/home/u/houdini20.0")
            ]
        );

        configs.toggle_all();
        assert_eq!(configs.checked_count(), 3);
        configs.toggle_all();
        assert_eq!(configs.checked_count(), 0);
    }
}
