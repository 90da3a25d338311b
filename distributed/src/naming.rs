use std::fmt;

/// Every store file a job reads or writes. Map and reduce tasks find each
/// other's data through these names alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreName {
    /// Shard written by the splitter.
    MapSource(usize),
    /// Local copy of a shard fetched from its endpoint.
    MapInput(usize),
    /// Bucket `bucket` produced by map task `map`.
    MapOutput { map: usize, bucket: usize },
    /// Local copy of a bucket fetched by the reduce task that owns it.
    ReduceInput { map: usize, bucket: usize },
    ReduceOutput(usize),
}

impl StoreName {
    pub fn url(&self, addr: &str) -> String {
        format!("http://{addr}/data/{self}")
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreName::MapSource(m) => write!(f, "map_{m}_source.db"),
            StoreName::MapInput(m) => write!(f, "map_{m}_input.db"),
            StoreName::MapOutput { map, bucket } => write!(f, "map_{map}_output_{bucket}.db"),
            StoreName::ReduceInput { map, bucket } => {
                write!(f, "reduce_{bucket}_input_{map}.db")
            }
            StoreName::ReduceOutput(r) => write!(f, "reduce_{r}_output.db"),
        }
    }
}
