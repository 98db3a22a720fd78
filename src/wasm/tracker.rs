//! Page-side obstacle tracking: selector queries and the listeners that
//! trigger them.

use super::render::host_error;
use crate::driver::ObstacleSource;
use crate::error::RenderError;
use crate::geometry::{self, Rect};
use log::warn;
use std::rc::Rc;
use wasm_bindgen::{closure::Closure, JsCast};
use web_sys::{
    AddEventListenerOptions, Document, Element, MutationObserver, MutationObserverInit, Window,
};

/// Resolves selectors against the live document.
pub struct DomObstacles {
    window: Window,
    document: Document,
}

impl DomObstacles {
    pub fn new(window: Window, document: Document) -> Self {
        Self { window, document }
    }
}

impl ObstacleSource for DomObstacles {
    fn rects_for_selector(&self, selector: &str) -> Vec<Rect> {
        let nodes = match self.document.query_selector_all(selector) {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("bad obstacle selector {:?}: {:?}", selector, e);
                return Vec::new();
            }
        };
        let inner_height = self
            .window
            .inner_height()
            .ok()
            .and_then(|h| h.as_f64())
            .unwrap_or(0.0);
        let dpr = self.window.device_pixel_ratio();

        geometry::cap_rects(
            (0..nodes.length())
                .filter_map(|i| nodes.item(i))
                .filter_map(|node| node.dyn_into::<Element>().ok())
                .map(|el| {
                    let r = el.get_bounding_client_rect();
                    Rect::from_client(r.left(), r.bottom(), r.width(), r.height(), inner_height, dpr)
                }),
        )
    }
}

/// Rects for `selector` in the current window, capped at
/// [`geometry::MAX_RECTS`]. Empty without a window or document.
pub fn rects_for_selector(selector: &str) -> Vec<Rect> {
    let Some(window) = web_sys::window() else {
        return Vec::new();
    };
    let Some(document) = window.document() else {
        return Vec::new();
    };
    DomObstacles::new(window, document).rects_for_selector(selector)
}

type MutationCallback = Closure<dyn FnMut(js_sys::Array, MutationObserver)>;

/// Resize, scroll and mutation hooks for one session. Dropping it detaches
/// all of them.
pub struct Listeners {
    window: Window,
    on_resize: Closure<dyn FnMut()>,
    on_scroll: Option<Closure<dyn FnMut()>>,
    observer: Option<(MutationObserver, MutationCallback)>,
}

impl Listeners {
    /// `on_resize` always fires on window resize. When `track_page` is set,
    /// `on_change` also fires on scroll and on any change below `<body>`.
    pub fn attach(
        window: &Window,
        document: &Document,
        track_page: bool,
        on_resize: Rc<dyn Fn()>,
        on_change: Rc<dyn Fn()>,
    ) -> Result<Self, RenderError> {
        let on_resize = Closure::wrap(Box::new(move || on_resize()) as Box<dyn FnMut()>);
        window
            .add_event_listener_with_callback("resize", on_resize.as_ref().unchecked_ref())
            .map_err(host_error)?;

        let mut listeners = Self {
            window: window.clone(),
            on_resize,
            on_scroll: None,
            observer: None,
        };
        if !track_page {
            return Ok(listeners);
        }

        let scroll_change = on_change.clone();
        let on_scroll = Closure::wrap(Box::new(move || scroll_change()) as Box<dyn FnMut()>);
        let opts = AddEventListenerOptions::new();
        opts.set_passive(true);
        window
            .add_event_listener_with_callback_and_add_event_listener_options(
                "scroll",
                on_scroll.as_ref().unchecked_ref(),
                &opts,
            )
            .map_err(host_error)?;
        listeners.on_scroll = Some(on_scroll);

        if let Some(body) = document.body() {
            let on_mutation = Closure::wrap(Box::new(move |_: js_sys::Array, _: MutationObserver| {
                on_change()
            }) as Box<dyn FnMut(js_sys::Array, MutationObserver)>);
            let observer =
                MutationObserver::new(on_mutation.as_ref().unchecked_ref()).map_err(host_error)?;
            let init = MutationObserverInit::new();
            init.set_child_list(true);
            init.set_subtree(true);
            init.set_attributes(true);
            observer
                .observe_with_options(&body, &init)
                .map_err(host_error)?;
            listeners.observer = Some((observer, on_mutation));
        }

        Ok(listeners)
    }
}

impl Drop for Listeners {
    fn drop(&mut self) {
        let _ = self
            .window
            .remove_event_listener_with_callback("resize", self.on_resize.as_ref().unchecked_ref());
        if let Some(on_scroll) = &self.on_scroll {
            let _ = self
                .window
                .remove_event_listener_with_callback("scroll", on_scroll.as_ref().unchecked_ref());
        }
        if let Some((observer, _)) = &self.observer {
            observer.disconnect();
        }
    }
}
