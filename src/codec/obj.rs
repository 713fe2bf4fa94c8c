// src/codec/obj.rs
// Wavefront OBJ/MTL reading and writing.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::codec::{ImageRepacker, MeshCodec, TextureRepacker};
use crate::error::{Result, TilerError};
use crate::geometry::{Vertex2, Vertex3};
use crate::mesh::{Face, Material, Mesh, MeshData, TexturedFace, TexturedMesh, ROOT_NAME};

/// One face corner as written in the file: position and optional UV index,
/// both already resolved to zero-based.
#[derive(Debug, Clone, Copy)]
struct ObjCorner {
    vertex: usize,
    uv: Option<usize>,
}

#[derive(Debug)]
struct ObjFace {
    corners: [ObjCorner; 3],
    material: Option<usize>,
}

pub struct ObjCodec {
    repacker: Box<dyn TextureRepacker>,
}

impl Default for ObjCodec {
    fn default() -> Self {
        Self::new(ImageRepacker::default())
    }
}

impl ObjCodec {
    pub fn new(repacker: impl TextureRepacker + 'static) -> Self {
        ObjCodec {
            repacker: Box::new(repacker),
        }
    }

    fn decode_error(path: &Path, line: usize, message: impl Into<String>) -> TilerError {
        TilerError::Decode {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }

    fn parse_floats<const N: usize>(
        path: &Path,
        line_no: usize,
        tokens: &[&str],
    ) -> Result<[f64; N]> {
        if tokens.len() < N {
            return Err(Self::decode_error(
                path,
                line_no,
                format!("expected {N} numbers, found {}", tokens.len()),
            ));
        }
        let mut out = [0.0; N];
        for (slot, token) in out.iter_mut().zip(tokens) {
            let value = token
                .parse::<f64>()
                .map_err(|e| Self::decode_error(path, line_no, format!("bad number '{token}': {e}")))?;
            if !value.is_finite() {
                return Err(Self::decode_error(path, line_no, format!("non-finite number '{token}'")));
            }
            *slot = value;
        }
        Ok(out)
    }

    /// Resolves a 1-based (or negative, relative) OBJ index against `count`
    /// elements read so far.
    fn resolve_index(path: &Path, line_no: usize, token: &str, count: usize) -> Result<usize> {
        let raw: i64 = token
            .parse()
            .map_err(|_| Self::decode_error(path, line_no, format!("bad index '{token}'")))?;
        let resolved = if raw > 0 {
            raw - 1
        } else if raw < 0 {
            count as i64 + raw
        } else {
            -1
        };
        if resolved < 0 || resolved >= count as i64 {
            return Err(Self::decode_error(
                path,
                line_no,
                format!("index {raw} out of range ({count} defined)"),
            ));
        }
        Ok(resolved as usize)
    }

    fn parse_corner(
        path: &Path,
        line_no: usize,
        token: &str,
        vertex_count: usize,
        uv_count: usize,
    ) -> Result<ObjCorner> {
        let mut parts = token.split('/');
        let vertex = match parts.next() {
            Some(v) if !v.is_empty() => Self::resolve_index(path, line_no, v, vertex_count)?,
            _ => return Err(Self::decode_error(path, line_no, format!("bad face corner '{token}'"))),
        };
        let uv = match parts.next() {
            Some(t) if !t.is_empty() => Some(Self::resolve_index(path, line_no, t, uv_count)?),
            _ => None,
        };
        Ok(ObjCorner { vertex, uv })
    }

    fn load_mtl(path: &Path, materials: &mut Vec<Material>) -> Result<()> {
        let text = fs::read_to_string(path).map_err(|e| TilerError::io(path, e))?;
        let base = path.parent().unwrap_or(Path::new("."));

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.split_first() {
                Some((&"newmtl", rest)) => {
                    materials.push(Material::new(rest.join(" ")));
                }
                Some((&"Kd", rest)) => {
                    let kd = Self::parse_floats::<3>(path, line_no, rest)?;
                    match materials.last_mut() {
                        Some(m) => m.diffuse = Some(kd),
                        None => return Err(Self::decode_error(path, line_no, "Kd before newmtl")),
                    }
                }
                Some((&"map_Kd", rest)) => {
                    // Options may precede the file name; the name comes last.
                    let file = rest
                        .last()
                        .ok_or_else(|| Self::decode_error(path, line_no, "map_Kd without file"))?;
                    match materials.last_mut() {
                        Some(m) => m.texture = Some(base.join(file)),
                        None => return Err(Self::decode_error(path, line_no, "map_Kd before newmtl")),
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn build_mesh(
        vertices: Vec<Vertex3>,
        uvs: Vec<Vertex2>,
        faces: Vec<ObjFace>,
        mut materials: Vec<Material>,
    ) -> Mesh {
        let fully_textured = !uvs.is_empty()
            && !materials.is_empty()
            && faces.iter().all(|f| f.corners.iter().all(|c| c.uv.is_some()));

        if !fully_textured {
            if !uvs.is_empty() {
                warn!("mesh has texture coordinates on only some faces; loading geometry only");
            }
            let faces = faces
                .iter()
                .map(|f| Face::new(f.corners[0].vertex, f.corners[1].vertex, f.corners[2].vertex))
                .collect();
            return Mesh::Plain(MeshData::new(ROOT_NAME, vertices, faces));
        }

        let mut default_material = None;
        let mut textured_faces = Vec::with_capacity(faces.len());
        for f in &faces {
            let material = match f.material {
                Some(m) => m,
                None => *default_material.get_or_insert_with(|| {
                    materials.push(Material::new("default"));
                    materials.len() - 1
                }),
            };
            textured_faces.push(TexturedFace::new(
                f.corners.map(|c| c.vertex),
                f.corners.map(|c| c.uv.unwrap_or(0)),
                material,
            ));
        }
        Mesh::Textured(TexturedMesh::new(ROOT_NAME, vertices, uvs, textured_faces, materials))
    }

    fn write_obj<W: Write>(out: &mut W, mesh: &Mesh, mtl_name: Option<&str>) -> io::Result<()> {
        writeln!(out, "# {}", mesh.name())?;
        if let Some(mtl) = mtl_name {
            writeln!(out, "mtllib {mtl}")?;
        }
        for v in mesh.vertices() {
            writeln!(out, "v {} {} {}", v.x, v.y, v.z)?;
        }

        match mesh {
            Mesh::Plain(m) => {
                for f in &m.faces {
                    let [a, b, c] = f.vertices;
                    writeln!(out, "f {} {} {}", a + 1, b + 1, c + 1)?;
                }
            }
            Mesh::Textured(m) => {
                for uv in &m.uvs {
                    writeln!(out, "vt {} {}", uv.u, uv.v)?;
                }
                let mut current = None;
                for f in &m.faces {
                    if current != Some(f.material) {
                        writeln!(out, "usemtl {}", m.materials[f.material].name)?;
                        current = Some(f.material);
                    }
                    let [a, b, c] = f.vertices;
                    let [ta, tb, tc] = f.uvs;
                    writeln!(
                        out,
                        "f {}/{} {}/{} {}/{}",
                        a + 1,
                        ta + 1,
                        b + 1,
                        tb + 1,
                        c + 1,
                        tc + 1
                    )?;
                }
            }
        }
        out.flush()
    }

    fn write_mtl<W: Write>(out: &mut W, materials: &[(String, Option<[f64; 3]>, Option<String>)]) -> io::Result<()> {
        for (name, diffuse, texture) in materials {
            writeln!(out, "newmtl {name}")?;
            if let Some([r, g, b]) = diffuse {
                writeln!(out, "Kd {r} {g} {b}")?;
            }
            if let Some(texture) = texture {
                writeln!(out, "map_Kd {texture}")?;
            }
            writeln!(out)?;
        }
        out.flush()
    }
}

impl MeshCodec for ObjCodec {
    fn load(&self, path: &Path) -> Result<Mesh> {
        let text = fs::read_to_string(path).map_err(|e| TilerError::io(path, e))?;
        let base = path.parent().unwrap_or(Path::new("."));

        let mut vertices = Vec::new();
        let mut uvs = Vec::new();
        let mut faces = Vec::new();
        let mut materials: Vec<Material> = Vec::new();
        let mut current_material = None;

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some((&keyword, rest)) = tokens.split_first() else {
                continue;
            };

            match keyword {
                "v" => {
                    let [x, y, z] = Self::parse_floats::<3>(path, line_no, rest)?;
                    vertices.push(Vertex3::new(x, y, z));
                }
                "vt" => {
                    let [u, v] = Self::parse_floats::<2>(path, line_no, rest)?;
                    uvs.push(Vertex2::new(u, v));
                }
                "f" => {
                    if rest.len() < 3 {
                        return Err(Self::decode_error(path, line_no, "face with fewer than 3 corners"));
                    }
                    let corners = rest
                        .iter()
                        .map(|t| Self::parse_corner(path, line_no, t, vertices.len(), uvs.len()))
                        .collect::<Result<Vec<_>>>()?;
                    // Fan triangulation of polygons.
                    for i in 1..corners.len() - 1 {
                        faces.push(ObjFace {
                            corners: [corners[0], corners[i], corners[i + 1]],
                            material: current_material,
                        });
                    }
                }
                "mtllib" => {
                    let mtl_path: PathBuf = base.join(rest.join(" "));
                    Self::load_mtl(&mtl_path, &mut materials)?;
                }
                "usemtl" => {
                    let name = rest.join(" ");
                    current_material = Some(match materials.iter().position(|m| m.name == name) {
                        Some(i) => i,
                        None => {
                            warn!("{}:{}: material '{}' not defined", path.display(), line_no, name);
                            materials.push(Material::new(name));
                            materials.len() - 1
                        }
                    });
                }
                "vn" | "o" | "g" | "s" | "l" | "p" => {}
                other if other.starts_with('#') => {}
                other => debug!("{}:{}: ignoring '{}'", path.display(), line_no, other),
            }
        }

        debug!(
            "parsed {}: {} vertices, {} uvs, {} faces, {} materials",
            path.display(),
            vertices.len(),
            uvs.len(),
            faces.len(),
            materials.len()
        );
        Ok(Self::build_mesh(vertices, uvs, faces, materials))
    }

    fn write(&self, mesh: &Mesh, path: &Path) -> Result<()> {
        mesh.validate()?;
        let dir = path.parent().unwrap_or(Path::new("."));
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| mesh.name().to_string());

        let mtl_name = match mesh {
            Mesh::Textured(m) => {
                let mut entries = Vec::with_capacity(m.materials.len());
                for material in &m.materials {
                    let texture = match &material.texture {
                        Some(source) => Some(self.repacker.repack(
                            source,
                            m.textures_strategy,
                            dir,
                            &format!("{stem}-{}", material.name),
                        )?),
                        None => None,
                    };
                    entries.push((material.name.clone(), material.diffuse, texture));
                }

                let mtl_name = format!("{stem}.mtl");
                let mtl_path = dir.join(&mtl_name);
                let file = File::create(&mtl_path).map_err(|e| TilerError::io(&mtl_path, e))?;
                Self::write_mtl(&mut BufWriter::new(file), &entries)
                    .map_err(|e| TilerError::io(&mtl_path, e))?;
                Some(mtl_name)
            }
            Mesh::Plain(_) => None,
        };

        let file = File::create(path).map_err(|e| TilerError::io(path, e))?;
        Self::write_obj(&mut BufWriter::new(file), mesh, mtl_name.as_deref())
            .map_err(|e| TilerError::io(path, e))
    }
}
