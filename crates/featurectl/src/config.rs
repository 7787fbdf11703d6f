use clap::{Parser, ValueEnum};
use feature_filter::DuplicateOidPolicy;
use std::path::PathBuf;
use std::str::FromStr;

/// `featurectl` - hides, splits and picks features of a tiled mesh scene.
///
/// The scene is a JSON file listing tiles, their meshes, per-vertex feature
/// ids and property tables. Operations run in a fixed order: hide, unhide,
/// query, pick, reload, then the optional GPU pass.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Scene description (JSON).
    #[arg(env = "FEATURECTL_SCENE")]
    pub scene: PathBuf,

    /// Oids to hide, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub hide: Vec<u64>,

    /// Oids to restore after hiding, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub unhide: Vec<u64>,

    /// Oids to split out of their tiles; each also gets a mesh collector.
    #[arg(long, value_delimiter = ',')]
    pub query: Vec<u64>,

    /// Picks a triangle, as `TILE/MESH/TRIANGLE` (mesh by position in its tile).
    #[arg(long)]
    pub pick: Vec<PickTarget>,

    /// Tiles to reload from the scene file after the queries ran.
    #[arg(long, value_delimiter = ',')]
    pub reload: Vec<u64>,

    /// Overrides the uniform-vector budget of the device.
    #[arg(long, env = "FEATURECTL_UNIFORM_LIMIT")]
    pub uniform_limit: Option<usize>,

    /// Baseline length of the hidden-feature array.
    #[arg(long)]
    pub min_capacity: Option<usize>,

    /// How to resolve several features of one mesh sharing an oid.
    #[arg(long, value_enum)]
    pub duplicate_oids: Option<DuplicatePolicyArg>,

    /// Writes the compiled WGSL of the first filtered material here.
    #[arg(long)]
    pub wgsl_out: Option<PathBuf>,

    /// Builds pipelines and renders the scene on a headless device.
    #[arg(long, default_value_t = false)]
    pub gpu: bool,

    /// Offscreen target size for `--gpu`.
    #[arg(long, default_value_t = 256)]
    pub size: u32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DuplicatePolicyArg {
    FirstSeenWins,
    Reject,
}

impl From<DuplicatePolicyArg> for DuplicateOidPolicy {
    fn from(v: DuplicatePolicyArg) -> Self {
        match v {
            DuplicatePolicyArg::FirstSeenWins => DuplicateOidPolicy::FirstSeenWins,
            DuplicatePolicyArg::Reject => DuplicateOidPolicy::Reject,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PickTarget {
    pub tile: u64,
    pub mesh: usize,
    pub triangle: usize,
}

impl FromStr for PickTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let [tile, mesh, triangle] = parts.as_slice() else {
            return Err(format!("expected TILE/MESH/TRIANGLE, got '{s}'"));
        };
        let num = |v: &str| v.trim().parse::<u64>().map_err(|e| format!("'{v}': {e}"));
        Ok(Self {
            tile: num(*tile)?,
            mesh: num(*mesh)? as usize,
            triangle: num(*triangle)? as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pick_targets() {
        assert_eq!(
            "3/0/12".parse::<PickTarget>().unwrap(),
            PickTarget { tile: 3, mesh: 0, triangle: 12 }
        );
        assert!("3/0".parse::<PickTarget>().is_err());
        assert!("a/0/1".parse::<PickTarget>().is_err());
    }

    #[test]
    fn oid_lists_are_comma_separated() {
        let args = Args::parse_from(["featurectl", "scene.json", "--hide", "1,2,3", "--pick", "1/0/0"]);
        assert_eq!(args.hide, vec![1, 2, 3]);
        assert_eq!(args.pick.len(), 1);
        assert!(!args.gpu);
    }
}
