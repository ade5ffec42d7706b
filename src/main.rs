// bunch of standard library stuff
use std::path::Path;
use std::fs::File;
use std::io::{BufRead, BufReader};
extern crate cairo;

//////////////////////////////////////////////////////////////////////
// use error chain so we can use Result<> everywhere
// for error handling

#[macro_use]
extern crate error_chain;

mod errors {

    error_chain!{

        foreign_links {
            Fmt(::std::fmt::Error);
            Io(::std::io::Error) #[cfg(unix)];
            Cairo(::cairo::Error);
            CairoIo(::cairo::IoError);
        }

        errors {
            InvalidArgument(msg: String) {
                description("invalid argument")
                display("invalid argument: {:}", msg)
            }
        }

    }

}

use errors::*;

//////////////////////////////////////////////////////////////////////
// define some statically allocated maps for
// lookups during parsing

use phf::phf_map;

//////////////////////////////////////////////////////////////////////
// define some constants for Robinson triangles

const PHI: f64 = 1.618033988749895;
const INVPHI: f64 = 1.0 / PHI;
const PI: f64 = std::f64::consts::PI;
const TWO_PI: f64 = 2.0 * PI;

// the seed star is a fan of 10 acute tiles around the origin, one
// per sector of angle 2*pi/10

const NUM_SECTORS: usize = 10;
const SECTOR_ANGLE: f64 = TWO_PI / (NUM_SECTORS as f64);
const SEED_RADIUS: f64 = 1.0;

//////////////////////////////////////////////////////////////////////
// constants for output

const INCH: f64 = 72.0;
const FIGURE_INCHES: f64 = 10.0;

const DEFAULT_IMAGE_SIZE: f64 = 3000.0;
const DEFAULT_LINE_WIDTH: f64 = 0.3;

const PAD_FRAC: f64 = 0.05;

const GRAY: [f64; 3] = [0.8, 0.8, 0.8];
const ACUTE_COLOR: [f64; 3] = [1.0, 0.6, 0.2];
const OBTUSE_COLOR: [f64; 3] = [0.2, 0.6, 1.0];

//////////////////////////////////////////////////////////////////////
// pull in some types from nalgebra

type Vec2d = nalgebra::Vector2<f64>;
type Vec3d = nalgebra::Vector3<f64>;
type Point2d = nalgebra::geometry::Point2<f64>;
type Translation2d = nalgebra::Translation2<f64>;
type Transform2d = nalgebra::Transform2<f64>;
type Matrix3d = nalgebra::Matrix3<f64>;

//////////////////////////////////////////////////////////////////////
// Rect2d type has lower-left p0 and upper-right p1

struct Rect2d {

    p0: Point2d,
    p1: Point2d

}

impl Rect2d {

    // empty rectangle has p0 > p1
    fn empty() -> Self {

        let p0 = Point2d::new(f64::MAX, f64::MAX);
        let p1 = -p0;

        Rect2d { p0: p0, p1: p1 }

    }

    // new rect from points
    fn new(p0: Point2d, p1: Point2d) -> Self {
        Rect2d { p0: p0, p1: p1 }
    }

    // expand this rect to include the given point
    fn expand(&mut self, p: &Point2d) {
        self.p0 = self.p0.inf(p);
        self.p1 = self.p1.sup(p);
    }

    // dimensions of this rect
    fn dims(&self) -> Vec2d {
        self.p1 - self.p0
    }

    // center of this rect
    fn center(&self) -> Point2d {
        self.p0 + 0.5*(self.p1 - self.p0)
    }

}

//////////////////////////////////////////////////////////////////////
//
// make a Transform2d that will translate and scale the given
// contents_rect (input) to the given page_rect (output).
//
// always includes vertical flip because graphics coordinate system
// is left-handed (y increases going down)
//

fn get_page_transform(contents_rect: &Rect2d,
                      page_rect: &Rect2d) -> (Transform2d, f64) {

    let cdims = contents_rect.dims();
    let pdims = page_rect.dims();

    let scl = (pdims.component_div(&cdims)).min();

    let cmid = contents_rect.center();
    let pmid = page_rect.center();

    let translate_page = Translation2d::new(pmid[0], pmid[1]);

    let scale = Transform2d::from_matrix_unchecked(
        Matrix3d::new(
            scl, 0.0, 0.0,
            0.0, -scl, 0.0,
            0.0, 0.0, 1.0
        )
    );

    let translate_points = Translation2d::new(-cmid[0], -cmid[1]);

    let transform = translate_page * scale * translate_points;

    (transform, scl)

}

//////////////////////////////////////////////////////////////////////
// Robinson triangle tiles

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum TileType {
    Acute,
    Obtuse
}

// a tile is three vertices plus a type tag - the vertex order is
// significant because downstream orientation classification treats
// A -> C as the tile's directional edge

#[derive(Debug, PartialEq, Clone, Copy)]
struct Tile {
    a: Point2d,
    b: Point2d,
    c: Point2d,
    ttype: TileType
}

impl Tile {

    fn new(a: Point2d, b: Point2d, c: Point2d, ttype: TileType) -> Self {
        Tile { a: a, b: b, c: c, ttype: ttype }
    }

    // vertices in order
    fn points(&self) -> [Point2d; 3] {
        [self.a, self.b, self.c]
    }

    // replace this tile with the 2 or 3 smaller tiles given by the
    // Robinson substitution rules - split points sit at 1/phi along
    // the relevant edges, and the children exactly cover the parent

    fn subdivide(&self) -> Vec<Tile> {

        match self.ttype {

            TileType::Acute => {

                let p = self.a + INVPHI*(self.b - self.a);

                vec![ Tile::new(self.c, p, self.b, TileType::Acute),
                      Tile::new(p, self.c, self.a, TileType::Obtuse) ]

            }

            TileType::Obtuse => {

                let q = self.b + INVPHI*(self.a - self.b);
                let r = self.b + INVPHI*(self.c - self.b);

                vec![ Tile::new(r, self.c, self.a, TileType::Obtuse),
                      Tile::new(q, r, self.b, TileType::Obtuse),
                      Tile::new(r, q, self.a, TileType::Acute) ]

            }

        }

    }

    // angular bucket in 0..10 for the direction of vector C - A,
    // used downstream to pick fill colors

    fn orientation_bucket(&self) -> Result<usize> {

        let vec = self.c - self.a;

        if vec.x == 0.0 && vec.y == 0.0 {
            bail!(ErrorKind::InvalidArgument(
                "can't orient a tile with coincident vertices".to_string()));
        }

        let angle = vec.y.atan2(vec.x).rem_euclid(TWO_PI);

        Ok(((angle / SECTOR_ANGLE).round() as usize) % NUM_SECTORS)

    }

}

//////////////////////////////////////////////////////////////////////
// construct the initial ring of 10 acute tiles forming a decagonal
// star around the origin - tile i has its apex at the origin and
// spans angles 2*pi*i/10 to 2*pi*(i+1)/10 at the seed radius

fn create_seed_tiles() -> Vec<Tile> {

    let mut tiles = Vec::new();

    for i in 0..NUM_SECTORS {

        let angle1 = SECTOR_ANGLE * (i as f64);
        let angle2 = SECTOR_ANGLE * ((i + 1) as f64);

        let a = Point2d::origin();
        let b = Point2d::new(SEED_RADIUS*angle1.cos(), SEED_RADIUS*angle1.sin());
        let c = Point2d::new(SEED_RADIUS*angle2.cos(), SEED_RADIUS*angle2.sin());

        tiles.push(Tile::new(a, b, c, TileType::Acute));

    }

    tiles

}

//////////////////////////////////////////////////////////////////////
// subdivide every input tile exactly depth times and return the
// resulting leaves.
//
// the work list is an explicit heap-allocated stack rather than
// native recursion, so depth is bounded by memory alone - each tile
// yields 2 or 3 children per step, for at most 10*3^depth leaves
// from the standard seed star.
//
// the list is LIFO: leaves come out depth-first with the last input
// tile's descendants first, stable for a given input

fn expand(initial_tiles: &[Tile], depth: i64) -> Result<Vec<Tile>> {

    if depth < 0 {
        bail!(ErrorKind::InvalidArgument(
            format!("expansion depth must be non-negative, got {:}", depth)));
    }

    let mut work: Vec<(Tile, i64)> =
        initial_tiles.iter().map(|&tile| (tile, 0)).collect();

    let mut result = Vec::new();

    while let Some((tile, current_depth)) = work.pop() {

        if current_depth == depth {

            result.push(tile);

        } else {

            for child in tile.subdivide() {
                work.push((child, current_depth + 1));
            }

        }

    }

    Ok(result)

}

//////////////////////////////////////////////////////////////////////
// fill color selection

#[derive(Debug, PartialEq, Clone, Copy)]
enum ColorMode {
    Mono,
    Type,
    Orientation
}

// map keywords in spec files to color modes - "color" is the
// orientation-based rainbow and also the default

static COLOR_MODE_LOOKUP: phf::Map<&'static str, ColorMode> = phf_map! {
    "mono" => ColorMode::Mono,
    "type" => ColorMode::Type,
    "color" => ColorMode::Orientation
};

// hue, saturation, value in [0, 1] to rgb

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Vec3d {

    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;

    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match (i as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q)
    };

    Vec3d::new(r, g, b)

}

fn tile_color(tile: &Tile, mode: ColorMode) -> Result<Vec3d> {

    let color = match mode {

        ColorMode::Mono => {
            Vec3d::new(GRAY[0], GRAY[1], GRAY[2])
        }

        ColorMode::Type => {

            let c = match tile.ttype {
                TileType::Acute => ACUTE_COLOR,
                TileType::Obtuse => OBTUSE_COLOR
            };

            Vec3d::new(c[0], c[1], c[2])

        }

        ColorMode::Orientation => {

            let idx = tile.orientation_bucket()?;

            hsv_to_rgb((idx as f64) / (NUM_SECTORS as f64), 0.9, 0.9)

        }

    };

    Ok(color)

}

//////////////////////////////////////////////////////////////////////
// convenience wrappers for passing nalgebra types to cairo

trait CairoVecOps {

    fn setcolor(&self, v: &Vec3d);
    fn drawtri(&self, p0: &Point2d, p1: &Point2d, p2: &Point2d);

}

impl CairoVecOps for cairo::Context {

    fn setcolor(&self, v: &Vec3d) {
        self.set_source_rgb(v[0], v[1], v[2]);
    }

    fn drawtri(&self, p0: &Point2d, p1: &Point2d, p2: &Point2d) {
        self.move_to(p0[0], p0[1]);
        self.line_to(p1[0], p1[1]);
        self.line_to(p2[0], p2[1]);
        self.close_path();
    }

}

//////////////////////////////////////////////////////////////////////
// bounding rectangle of a set of tiles, padded on all sides by 5%
// of the larger dimension

fn tiling_bounds(tiles: &[Tile]) -> Rect2d {

    let mut rect = Rect2d::empty();

    for tile in tiles {
        for p in &tile.points() {
            rect.expand(p);
        }
    }

    let dims = rect.dims();
    let padding = PAD_FRAC * dims.x.max(dims.y);

    Rect2d::new(rect.p0 - Vec2d::repeat(padding),
                rect.p1 + Vec2d::repeat(padding))

}

//////////////////////////////////////////////////////////////////////
// fill and outline every tile into the given page rect

fn draw_tiling(ctx: &cairo::Context,
               tiles: &[Tile],
               mode: ColorMode,
               line_width: f64,
               page_rect: &Rect2d) -> Result<()> {

    let bounds = tiling_bounds(tiles);

    let (transform, _) = get_page_transform(&bounds, page_rect);

    ctx.set_line_width(line_width);
    ctx.set_line_join(cairo::LineJoin::Round);

    for tile in tiles {

        let [a, b, c] = tile.points();

        ctx.drawtri(&(transform * a),
                    &(transform * b),
                    &(transform * c));

        ctx.setcolor(&tile_color(tile, mode)?);
        ctx.fill_preserve();

        ctx.set_source_rgb(0.0, 0.0, 0.0);
        ctx.stroke();

    }

    Ok(())

}

//////////////////////////////////////////////////////////////////////
// output formats, selected by filename extension

#[derive(Debug, PartialEq, Clone, Copy)]
enum OutputFormat {
    Png,
    Svg
}

// anything other than .png or .svg falls back to .png with the
// extension appended

fn output_format(filename: &str) -> (String, OutputFormat) {

    let lower = filename.to_lowercase();

    if lower.ends_with(".png") {
        (filename.to_string(), OutputFormat::Png)
    } else if lower.ends_with(".svg") {
        (filename.to_string(), OutputFormat::Svg)
    } else {
        println!("no valid extension on {:}, appending .png", filename);
        (filename.to_owned() + ".png", OutputFormat::Png)
    }

}

//////////////////////////////////////////////////////////////////////
// render a tile set to a png or svg file - image_size is the edge
// length of the square output in device units, line_width is the
// outline width in points at the reference figure size

fn render_tiling(tiles: &[Tile],
                 mode: ColorMode,
                 image_size: f64,
                 line_width: f64,
                 filename: &str) -> Result<()> {

    if tiles.is_empty() {
        bail!(ErrorKind::InvalidArgument("no tiles to render".to_string()));
    }

    let (filename, format) = output_format(filename);

    let page_rect = Rect2d::new(Point2d::origin(),
                                Point2d::new(image_size, image_size));

    let device_line_width = line_width * image_size / (FIGURE_INCHES * INCH);

    match format {

        OutputFormat::Png => {

            let surface = cairo::ImageSurface::create(
                cairo::Format::Rgb24,
                image_size as i32,
                image_size as i32)?;

            let ctx = cairo::Context::new(&surface);

            ctx.set_source_rgb(1.0, 1.0, 1.0);
            ctx.paint();

            draw_tiling(&ctx, tiles, mode, device_line_width, &page_rect)?;

            let mut file = File::create(&filename)?;
            surface.write_to_png(&mut file)?;

        }

        OutputFormat::Svg => {

            let surface = cairo::SvgSurface::new(
                image_size, image_size, Some(&filename))?;

            let ctx = cairo::Context::new(&surface);

            ctx.set_source_rgb(1.0, 1.0, 1.0);
            ctx.paint();

            draw_tiling(&ctx, tiles, mode, device_line_width, &page_rect)?;

            surface.finish();

        }

    }

    println!("wrote {:}", filename);

    Ok(())

}

//////////////////////////////////////////////////////////////////////
// overengineered macro for parsing spec files

macro_rules! parse_tokens {

    // finalizer - no more input to match, just error if remaining
    // input or return collected outputs
    ($it:ident { } -> { $($tuple:ident,)* } ) => (
        match $it.next() {
            Some(value) => Err(format!("found extra token(s) starting with \"{:}\"", value)),
            None => Ok(($($tuple),*))
        }
    );

    // name, String pair
    ($it:ident { $name:ident : String, $($ts:tt)* } -> { $($tuple:ident,)* } ) => (
        match $it.next() {
            None => Err(format!("missing token for {:}", stringify!($name)) ),
            Some(value) => {
                let $name = value.to_string();
                parse_tokens!( $it { $($ts)* } -> { $($tuple,)* $name, } )
            }
        }
    );

    // string map
    ($it:ident { $name:ident from $map:expr, $($ts:tt)* } -> { $($tuple:ident,)* } ) => (
        match $it.next() {
            None => Err(format!("missing token for {:}", stringify!($name)) ),
            Some(&value) => {
                if let Some(&k) = $map.get(value) {
                    let $name = (value.to_string(), k);
                    parse_tokens!( $it { $($ts)* } -> { $($tuple,)* $name, } )
                } else {
                    let mut extended: Vec<&str> = Vec::new();
                    extended.extend($map.keys());
                    Err(format!("unexpected value \"{:}\" for {:}, expected one of: {{\"{:}\"}}",
                                value, stringify!($name), extended.join("\", \"") ))
                }
            }
        }
    );

    // name, type pair
    ($it:ident { $name:ident : $type:ident, $($ts:tt)* } -> { $($tuple:ident,)* } ) => (
        match $it.next() {
            None => Err(format!("missing token for {:}", stringify!($name)) ),
            Some(value) => if let Ok($name) = value.parse::<$type>() {
                parse_tokens!( $it { $($ts)* } -> { $($tuple,)* $name, } )
            } else {
                Err(format!("error parsing {:} as type {:}",
                                       value, stringify!($type)))
            }
        }
    );

    // Entry point
    ($a:expr, { $($ts:tt)+ }) => (
        {
            let mut it = $a.iter();
            parse_tokens!( it { $($ts)* , } -> { } )
        }
    )

}

//////////////////////////////////////////////////////////////////////
// macros for inspecting/validating individual fields of TilingSpec

macro_rules! copy_field {

    ($dst:ident, $src:ident, $field:ident, $null:expr) => (
        if $src.$field != $null {
            if $dst.$field != $null {
                bail!("{:} is already set", stringify!($field));
            }
            $dst.$field = $src.$field;
        }
    );

    ($dst:ident, $src:ident, $field:ident) => (
        if $src.$field.is_some() {
            if $dst.$field.is_some() {
                bail!("{:} is already set", stringify!($field));
            }
            $dst.$field = $src.$field;
        }
    )

}

macro_rules! ensure_field {

    ($ts:ident, $fvec:ident, $field:ident, $null:expr) => (
        if $ts.$field == $null {
            $fvec.push(stringify!($field));
        }
    )

}

//////////////////////////////////////////////////////////////////////
// tiling spec - all of the knobs for one run, parsed from a
// keyword-per-line spec file

#[derive(Debug)]
struct TilingSpec {
    depth: i64,                // subdivision depth for the seed star
    colors: Option<ColorMode>, // fill selection, default orientation-based
    output: Option<String>,    // output filename, default from spec name
    image_size: f64,           // output edge length in device units
    line_width: f64            // tile outline width in points
}

impl TilingSpec {

    fn new() -> TilingSpec {
        TilingSpec {
            depth: i64::MIN,
            colors: None,
            output: None,
            image_size: -1.0,
            line_width: -1.0
        }
    }

    fn update(&mut self, other: TilingSpec) -> Result<()> {

        copy_field!(self, other, depth, i64::MIN);
        copy_field!(self, other, colors);
        copy_field!(self, other, output);
        copy_field!(self, other, image_size, -1.0);
        copy_field!(self, other, line_width, -1.0);

        Ok(())

    }

    fn parse_keyword(keyword: &str, rest: &[&str]) -> Result<TilingSpec> {

        let mut update = TilingSpec::new();

        match keyword {

            "depth" => {

                let depth = parse_tokens!(rest, { depth: i64 })?;

                update.depth = depth;

            },

            "colors" => {

                let colors = parse_tokens!(rest, {
                    colors from COLOR_MODE_LOOKUP
                })?;

                let (_, mode) = colors;
                update.colors = Some(mode);

            },

            "output" => {

                let filename = parse_tokens!(rest, { filename: String })?;

                update.output = Some(filename);

            },

            "image_size" => {

                let pixels = parse_tokens!(rest, { pixels: f64 })?;

                if pixels <= 0.0 {
                    bail!("image_size must be positive");
                }

                update.image_size = pixels;

            },

            "line_width" => {

                let points = parse_tokens!(rest, { points: f64 })?;

                if points <= 0.0 {
                    bail!("line_width must be positive");
                }

                update.line_width = points;

            },

            _ => {
                bail!("unrecognized keyword");
            }

        };

        Ok(update)

    }

    fn update_from(&mut self, line: &str) -> Result<()> {

        let mut trimmed = line.trim();

        if let Some(pos) = trimmed.find('#') {
            trimmed = &trimmed[0..pos];
        }

        if trimmed.len() == 0 {
            return Ok(());
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();

        let keyword = tokens[0];
        let rest = &tokens[1..];

        let update = Self::parse_keyword(keyword, rest).chain_err(
            || format!("while parsing keyword {:}", keyword))?;

        self.update(update)

    }

    fn parse(filename: &str, istr: &mut impl BufRead) -> Result<TilingSpec> {

        let mut ts = TilingSpec::new();
        let mut lineno = 0;

        loop {

            let mut line = String::new();

            lineno += 1;

            let len = istr.read_line(&mut line).chain_err(
                || format!("{:}:{:}: read error", filename, lineno))?;

            if len == 0 {
                break;
            }

            ts.update_from(line.as_str()).chain_err(
                || format!("{:}:{:}: parse error", filename, lineno))?;

        }

        let mut unset_fields = Vec::new();

        ensure_field!(ts, unset_fields, depth, i64::MIN);

        if !unset_fields.is_empty() {
            bail!("{:}: the following field(s) were unset: {:}",
                  filename, unset_fields.as_slice().join(", "));
        }

        Ok(ts)

    }

}

//////////////////////////////////////////////////////////////////////

fn run() -> Result<()> {

    let args: Vec<String> = std::env::args().collect();

    if args.len() != 2 {
        eprintln!("usage: {:?} SPECFILE", args[0]);
        std::process::exit(1);
    }

    let filename = Path::new(&args[1]);

    let basename = match filename.file_stem() {
        None => "tiling",
        Some(os_str) => os_str.to_str().unwrap_or("tiling")
    };

    let f = File::open(filename)?;
    let mut reader = BufReader::new(f);

    let ts = TilingSpec::parse(&args[1], &mut reader)?;

    let mode = ts.colors.unwrap_or(ColorMode::Orientation);

    let image_size = if ts.image_size > 0.0 {
        ts.image_size
    } else {
        DEFAULT_IMAGE_SIZE
    };

    let line_width = if ts.line_width > 0.0 {
        ts.line_width
    } else {
        DEFAULT_LINE_WIDTH
    };

    let output = match &ts.output {
        Some(output) => output.clone(),
        None => basename.to_owned() + ".png"
    };

    let seed_tiles = create_seed_tiles();

    let tiles = expand(&seed_tiles, ts.depth)?;

    println!("expanded {:} seed tiles to depth {:}, got {:} tiles",
             seed_tiles.len(), ts.depth, tiles.len());

    render_tiling(&tiles, mode, image_size, line_width, &output)?;

    Ok(())

}

quick_main!(run);

//////////////////////////////////////////////////////////////////////
