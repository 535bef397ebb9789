use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use voxfit::core::grid::AtomGrid;
use voxfit::core::typing::AtomTyper;

/// One row of an atom table: element symbol plus world coordinates.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AtomRecord {
    pub element: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One exported voxel of a rendered grid.
#[derive(Debug, Serialize)]
pub struct VoxelRecord {
    pub channel: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub value: f64,
}

pub fn read_atoms(path: &Path) -> Result<Vec<AtomRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut atoms = Vec::new();
    for record in reader.deserialize() {
        atoms.push(record?);
    }
    Ok(atoms)
}

pub fn write_atoms(path: &Path, atoms: &[AtomRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for atom in atoms {
        writer.serialize(atom)?;
    }
    writer.flush()?;
    Ok(())
}

/// Exports every voxel whose value exceeds `min_value`, with world
/// coordinates and the channel's name.
pub fn write_grid(path: &Path, grid: &AtomGrid, min_value: f64) -> Result<()> {
    let typer = grid.typer();
    let mut writer = csv::Writer::from_path(path)?;
    let n = grid.size();
    for c in 0..grid.values().channels() {
        let name = if c < typer.n_elem_types() {
            typer.elem_symbol(c).to_string()
        } else {
            format!("prop{}", c - typer.n_elem_types())
        };
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    let value = grid.values().get(c, x, y, z);
                    if value > min_value {
                        let coord = grid.voxel_center(x, y, z);
                        writer.serialize(VoxelRecord {
                            channel: name.clone(),
                            x: coord.x,
                            y: coord.y,
                            z: coord.z,
                            value,
                        })?;
                    }
                }
            }
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_tables_round_trip_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atoms.csv");
        let atoms = vec![
            AtomRecord {
                element: "C".to_string(),
                x: -1.54,
                y: 0.0,
                z: 0.25,
            },
            AtomRecord {
                element: "O".to_string(),
                x: 0.71,
                y: 1.17,
                z: 0.0,
            },
        ];
        write_atoms(&path, &atoms).unwrap();
        let read_back = read_atoms(&path).unwrap();
        assert_eq!(read_back, atoms);
    }

    #[test]
    fn reading_a_malformed_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.csv");
        std::fs::write(&path, "element,x,y,z\nC,not-a-number,0.0,0.0\n").unwrap();
        assert!(read_atoms(&path).is_err());
    }
}
