use quillnote_core::document::{create_document, Dimension, DocumentEditor, Position, Range};
use quillnote_core::media::{
    insert_uploaded_media, resolve_resize, Corner, GestureEnd, LocalMediaStore, MediaNodeView,
    MediaSurface, ResizeFrame, ResizeGesture, SurfaceError, MIN_MEDIA_EXTENT,
};
use rstest::rstest;

/// Records what the view asked the rendered element to do.
#[derive(Debug, Default)]
struct RecordingSurface {
    size: (f64, f64),
    offset: (f64, f64),
    frames: Vec<ResizeFrame>,
    detached: bool,
}

impl RecordingSurface {
    fn sized(width: f64, height: f64) -> Self {
        Self {
            size: (width, height),
            ..Self::default()
        }
    }
}

impl MediaSurface for RecordingSurface {
    fn measure(&self) -> Result<(f64, f64), SurfaceError> {
        if self.detached {
            return Err(SurfaceError::Detached);
        }
        Ok(self.size)
    }

    fn apply_frame(&mut self, frame: &ResizeFrame) -> Result<(), SurfaceError> {
        if self.detached {
            return Err(SurfaceError::Detached);
        }
        self.size = (frame.width, frame.height);
        self.offset = (frame.offset_x, frame.offset_y);
        self.frames.push(*frame);
        Ok(())
    }

    fn restore(&mut self, width: f64, height: f64) -> Result<(), SurfaceError> {
        self.size = (width, height);
        self.offset = (0.0, 0.0);
        Ok(())
    }
}

#[test]
fn uploaded_image_can_be_resized_from_a_west_corner() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LocalMediaStore::new(dir.path()).expect("store");
    let mut editor = DocumentEditor::open("<p>intro</p>");
    editor
        .set_selection(Range::caret(Position::new(0, 5)))
        .expect("caret");
    let uri = insert_uploaded_media(&mut editor, &store, b"GIF89a", "image/gif", Some("cat"))
        .expect("upload");

    let node_id = editor
        .document()
        .media_nodes()
        .next()
        .expect("media node")
        .id;
    let mut view = MediaNodeView::new(node_id, RecordingSurface::sized(200.0, 100.0));

    assert!(view.pointer_down(Corner::NorthWest, 100.0, 100.0));
    let frame = view.pointer_move(60.0, 90.0).expect("frame");
    assert_eq!((frame.width, frame.height), (220.0, 110.0));
    assert_eq!((frame.offset_x, frame.offset_y), (-20.0, -10.0));
    assert_eq!(editor.version(), 1, "moves never touch the document");

    assert_eq!(
        view.pointer_up(&mut editor),
        GestureEnd::Committed {
            width: 220.0,
            height: 110.0
        }
    );
    assert_eq!(view.surface().offset, (0.0, 0.0));

    let attrs = editor.media_attrs(node_id).expect("attrs");
    assert_eq!(attrs.width, Dimension::Px(220.0));
    assert_eq!(attrs.height, Dimension::Px(110.0));
    assert_eq!(attrs.alt.as_deref(), Some("cat"));
    assert!(editor
        .to_html()
        .contains(&format!(r#"<img src="{uri}" width="220" height="110" alt="cat">"#)));
}

#[test]
fn gesture_on_a_removed_node_is_skipped() {
    let mut editor =
        DocumentEditor::open(r#"<p>a</p><img src="https://q.test/x.png"><p>b</p>"#);
    let node_id = editor.document().media_nodes().next().expect("media").id;
    let mut view = MediaNodeView::new(node_id, RecordingSurface::sized(120.0, 80.0));
    assert!(view.pointer_down(Corner::SouthEast, 0.0, 0.0));
    view.pointer_move(30.0, 30.0).expect("frame");

    editor
        .set_selection(Range::new(Position::new(0, 1), Position::new(2, 0)))
        .expect("select across media");
    editor.insert_text(" ").expect("delete media");
    let version = editor.version();

    assert_eq!(view.pointer_up(&mut editor), GestureEnd::Skipped);
    assert_eq!(editor.version(), version);
    assert!(!view.is_resizing());
}

#[test]
fn detached_surface_refuses_to_start() {
    let surface = RecordingSurface {
        detached: true,
        ..RecordingSurface::sized(100.0, 100.0)
    };
    let mut view = MediaNodeView::new(uuid::Uuid::new_v4(), surface);
    assert!(!view.pointer_down(Corner::SouthWest, 0.0, 0.0));
    let mut editor = DocumentEditor::default();
    assert_eq!(view.pointer_up(&mut editor), GestureEnd::NotResizing);
}

#[rstest]
fn frames_never_shrink_below_the_minimum(
    #[values(Corner::NorthWest, Corner::NorthEast, Corner::SouthWest, Corner::SouthEast)]
    corner: Corner,
    #[values((400.0, 100.0), (100.0, 400.0), (120.0, 120.0))] start: (f64, f64),
) {
    let gesture = ResizeGesture::begin(corner, 500.0, 500.0, start.0, start.1).expect("gesture");
    for (x, y) in [(-2000.0, -2000.0), (3000.0, 3000.0), (500.0, 500.0)] {
        let frame = resolve_resize(&gesture, x, y).expect("frame");
        assert!(frame.width >= MIN_MEDIA_EXTENT - 1e-9);
        assert!(frame.height >= MIN_MEDIA_EXTENT - 1e-9);
        assert!((frame.width / frame.height - start.0 / start.1).abs() < 1e-9);
    }
}

#[test]
fn committed_size_matches_what_the_html_keeps() {
    let mut editor =
        DocumentEditor::open(r#"<p>a</p><img src="https://q.test/x.png" width="300" height="200">"#);
    let node_id = editor.document().media_nodes().next().expect("media").id;
    let mut view = MediaNodeView::new(node_id, RecordingSurface::sized(300.0, 200.0));

    assert!(view.pointer_down(Corner::SouthEast, 0.0, 0.0));
    let frame = view.pointer_move(10.0, 10.0).expect("frame");
    assert_eq!(frame.width, 310.0);
    assert!(frame.height > 206.666 && frame.height < 206.667);

    assert_eq!(
        view.pointer_up(&mut editor),
        GestureEnd::Committed {
            width: 310.0,
            height: 206.67
        }
    );
    assert_eq!(view.surface().size, (310.0, 206.67));

    let attrs = editor.media_attrs(node_id).expect("attrs");
    assert_eq!(attrs.height, Dimension::Px(206.67));
    let html = editor.to_html();
    assert!(html.contains(r#"width="310" height="206.67""#));

    let reloaded = create_document(&html);
    let reloaded_attrs = &reloaded.media_nodes().next().expect("media").attrs;
    assert_eq!(reloaded_attrs.width, attrs.width);
    assert_eq!(reloaded_attrs.height, attrs.height);
}
