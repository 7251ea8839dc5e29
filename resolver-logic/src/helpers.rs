use resolver_game::{Capacity, GameData, NodeIndex};

/// Remaining energy, or None if the player is dead.
pub fn validate_energy(energy: Capacity) -> Option<Capacity> {
    if energy <= 0 { None } else { Some(energy) }
}

pub fn path_names(path: &[NodeIndex], game_data: &GameData) -> Vec<String> {
    path.iter().map(|&idx| game_data.node_name(idx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_energy() {
        assert_eq!(validate_energy(1), Some(1));
        assert_eq!(validate_energy(0), None);
        assert_eq!(validate_energy(-30), None);
    }
}
